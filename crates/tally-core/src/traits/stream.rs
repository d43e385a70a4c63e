// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait for fire-and-forget event-stream producers.

use async_trait::async_trait;

use crate::error::TallyError;

/// A fire-and-forget event-stream producer (Kafka or similar).
///
/// The ledger publishes each priced event after its durable commit; a
/// publish failure is logged and never affects local durability.
#[async_trait]
pub trait EventStream: Send + Sync {
    /// Publishes one JSON payload to the named topic.
    async fn publish(&self, topic: &str, payload: serde_json::Value) -> Result<(), TallyError>;
}
