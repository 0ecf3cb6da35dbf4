//! Connection URL parsing and credential extraction.

use super::credentials::Credentials;
use crate::config::SourceConfig;
use crate::error::SchemaDocError;
use crate::models::Dialect;
use percent_encoding::percent_decode_str;
use std::time::Duration;

/// Decodes one percent-encoded URL component.
///
/// The value itself is never echoed back in the error.
fn decode_component(raw: &str, component: &str) -> crate::Result<String> {
    percent_decode_str(raw)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|_| {
            SchemaDocError::configuration(format!(
                "Connection string {component} is not valid UTF-8 after percent-decoding"
            ))
        })
}

/// Parses a source connection URL into a credential-free config and the
/// credentials it carried.
///
/// The scheme selects the dialect (`mysql`, `postgres`/`postgresql`,
/// `mssql`/`sqlserver`). Recognized query parameters:
/// `connect_timeout` and `query_timeout` (seconds) and
/// `trust_server_certificate` (`true`/`false`). User name, password and
/// database name are percent-decoded, so reserved characters such as `@`
/// or `:` must be written as `%40` and `%3A`.
///
/// # Arguments
/// * `connection_string` - Source connection URL
/// * `base` - Defaults for everything the URL does not specify
///
/// # Errors
/// Returns error if the URL is malformed, uses an unknown scheme, or a
/// decoded component is not valid UTF-8
///
/// # Example
/// ```rust
/// use schemadoc_core::{config::SourceConfig, models::Dialect, security::parse_connection_string};
///
/// let (config, creds) =
///     parse_connection_string("postgres://docs:pw@localhost/shop", &SourceConfig::default())?;
/// assert_eq!(config.dialect, Dialect::Pgsql);
/// assert_eq!(config.database.as_deref(), Some("shop"));
/// assert_eq!(creds.username(), "docs");
/// # Ok::<(), schemadoc_core::SchemaDocError>(())
/// ```
pub fn parse_connection_string(
    connection_string: &str,
    base: &SourceConfig,
) -> crate::Result<(SourceConfig, Credentials)> {
    let url = url::Url::parse(connection_string).map_err(|e| {
        SchemaDocError::configuration(format!(
            "Invalid connection string format: {}",
            e
        ))
    })?;

    let dialect = Dialect::from_scheme(url.scheme()).ok_or_else(|| {
        SchemaDocError::configuration(format!(
            "Unsupported connection scheme '{}'",
            url.scheme()
        ))
    })?;

    let host = url
        .host_str()
        .ok_or_else(|| {
            SchemaDocError::configuration("Missing host in connection string")
        })?
        .to_string();

    let mut config = SourceConfig {
        dialect,
        host,
        port: url.port(),
        database: None,
        ..base.clone()
    };

    let database = url.path().trim_start_matches('/');
    if !database.is_empty() {
        config.database = Some(decode_component(database, "database name")?);
    }

    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "connect_timeout" => {
                if let Ok(secs) = value.parse::<u64>()
                    && secs > 0
                {
                    config.connect_timeout = Duration::from_secs(secs);
                }
            }
            "query_timeout" => {
                if let Ok(secs) = value.parse::<u64>()
                    && secs > 0
                {
                    config.query_timeout = Duration::from_secs(secs);
                }
            }
            "trust_server_certificate" => {
                config.trust_server_certificate = value.eq_ignore_ascii_case("true");
            }
            _ => {}
        }
    }

    config.validate()?;

    let username = decode_component(url.username(), "user name")?;
    let password = url
        .password()
        .map(|password| decode_component(password, "password"))
        .transpose()?;
    let credentials = Credentials::new(username, password);

    Ok((config, credentials))
}
