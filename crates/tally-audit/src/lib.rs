// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tamper-evident audit log for the Tally pipeline.
//!
//! Stores SHA-256 prompt digests in a per-customer hash chain; any
//! mutation or reordering of a stored record breaks verification from that
//! point forward.

pub mod log;

pub use log::{AuditEvent, AuditLog};
