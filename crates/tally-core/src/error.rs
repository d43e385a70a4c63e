// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Tally metering pipeline.

use thiserror::Error;

/// The primary error type used across all Tally crates.
#[derive(Debug, Error)]
pub enum TallyError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, migration).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Malformed ingestion input. The tolerant ingestion path never raises
    /// this to its caller; it routes the payload to the dead-letter store.
    #[error("validation error: {0}")]
    Validation(String),

    /// FX conversion was requested for a currency absent from the snapshot.
    #[error("no FX rate stored for currency {currency}")]
    MissingRate { currency: String },

    /// Cost routing was invoked with an empty candidate set.
    #[error("cost routing requires at least one provider option")]
    NoOptions,

    /// An external accounting/webhook sink call failed. Callers that own a
    /// best-effort contract catch this, log it, and continue.
    #[error("sink {sink} failed: {source}")]
    Sink {
        sink: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// An external feed (FX rates, GPU spot prices) was unreachable or
    /// returned a malformed payload.
    #[error("feed error: {message}")]
    Feed { message: String },

    /// Provider name did not match any known provider class.
    #[error("unknown provider: {name}")]
    UnknownProvider { name: String },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}
