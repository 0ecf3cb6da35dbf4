//! Configuration types for source connections and synchronization passes.
//!
//! - `SourceConfig`: where and how to reach the source database
//! - `SyncConfig`: batching, timeouts and documentation policy of a pass
//!
//! # Security
//! These structs intentionally do NOT store passwords or credentials.
//! Credentials travel separately in [`crate::security::Credentials`].

mod connection;
mod sync;

pub use connection::SourceConfig;
pub use sync::SyncConfig;
