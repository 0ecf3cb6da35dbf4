//! Credential handling for source connections.
//!
//! - `credentials`: secure credential container with automatic memory zeroing
//! - `connection`: connection URL parsing into a credential-free
//!   [`SourceConfig`](crate::config::SourceConfig) plus [`Credentials`]

mod connection;
mod credentials;

pub use connection::parse_connection_string;
pub use credentials::Credentials;
