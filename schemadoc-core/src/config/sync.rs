//! Synchronization pass configuration.

use super::connection::DEFAULT_QUERY_TIMEOUT;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables of one synchronization pass.
///
/// Batch sizes exist to respect per-dialect bind parameter ceilings and are
/// deliberately configurable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Child rows per multi-row INSERT
    pub batch_size: usize,
    /// Ids per IN-clause when reading children of many parents
    pub id_chunk_size: usize,
    /// Wall-clock limit for one bulk catalog query
    pub query_timeout: Duration,
    /// Keep user-entered documentation when the source has no comment
    pub preserve_documentation: bool,
    /// Language tag stamped on newly created description rows
    pub language: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: 150,
            id_chunk_size: 1000,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            preserve_documentation: true,
            language: "en".to_string(),
        }
    }
}

impl SyncConfig {
    /// Validates pass parameters.
    ///
    /// # Errors
    /// Returns error if a batch size or timeout is out of range
    pub fn validate(&self) -> crate::Result<()> {
        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(crate::error::SchemaDocError::configuration(
                "batch_size must be between 1 and 1000",
            ));
        }

        if self.id_chunk_size == 0 || self.id_chunk_size > 10_000 {
            return Err(crate::error::SchemaDocError::configuration(
                "id_chunk_size must be between 1 and 10000",
            ));
        }

        if self.query_timeout.is_zero() {
            return Err(crate::error::SchemaDocError::configuration(
                "query_timeout must be greater than 0",
            ));
        }

        if self.language.is_empty() {
            return Err(crate::error::SchemaDocError::configuration(
                "language cannot be empty",
            ));
        }

        Ok(())
    }

    /// Builder method to set the insert batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Builder method to set the bulk query timeout.
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Builder method to choose between preserving and overwriting
    /// user-entered documentation.
    pub fn with_preserve_documentation(mut self, preserve: bool) -> Self {
        self.preserve_documentation = preserve;
        self
    }
}
