// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background
//! thread. Do NOT create additional Connection instances for writes.

use tally_core::TallyError;
use tracing::debug;

use crate::migrations;

/// Convert a tokio-rusqlite error into TallyError::Storage.
pub fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> TallyError {
    TallyError::Storage {
        source: Box::new(e),
    }
}

/// Single-writer SQLite database handle.
///
/// Wraps one `tokio_rusqlite::Connection`; every operation runs as a closure
/// on its background thread, which serializes all writes and gives each
/// operation an implicit transaction scope.
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open (or create) the database at `path`, apply PRAGMAs, and run all
    /// pending migrations.
    pub async fn open(path: &str) -> Result<Self, TallyError> {
        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(|e| TallyError::Storage {
                source: Box::new(e),
            })?;
        Self::initialize(conn, path).await
    }

    /// Open an in-memory database with the full schema applied.
    ///
    /// Intended for tests; each call gets an independent database.
    pub async fn open_in_memory() -> Result<Self, TallyError> {
        let conn = tokio_rusqlite::Connection::open_in_memory()
            .await
            .map_err(|e| TallyError::Storage {
                source: Box::new(e),
            })?;
        Self::initialize(conn, ":memory:").await
    }

    async fn initialize(conn: tokio_rusqlite::Connection, path: &str) -> Result<Self, TallyError> {
        conn.call(|conn| -> Result<(), rusqlite::Error> {
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;",
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        // Run migrations on the background thread; the refinery error is
        // carried out as a string because it is not a rusqlite error.
        let migrated = conn
            .call(|conn| -> Result<Result<(), String>, rusqlite::Error> {
                Ok(migrations::run_migrations(conn).map_err(|e| e.to_string()))
            })
            .await
            .map_err(map_tr_err)?;
        migrated.map_err(|msg| TallyError::Storage { source: msg.into() })?;

        debug!(path, "database opened and migrated");
        Ok(Self { conn })
    }

    /// Access the underlying tokio-rusqlite connection.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Checkpoint the WAL and flush pending writes.
    pub async fn close(&self) -> Result<(), TallyError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}
