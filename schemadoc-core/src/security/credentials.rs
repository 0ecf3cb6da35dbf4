//! Secure credential container with automatic memory zeroing.
//!
//! Passwords are never exposed in debug output or logs and are cleared
//! from memory when the credentials are dropped.

use zeroize::{Zeroize, Zeroizing};

/// Source database credentials, zeroed on drop.
///
/// # Example
///
/// ```rust
/// use schemadoc_core::security::Credentials;
///
/// let creds = Credentials::new("docs".to_string(), Some("secret".to_string()));
/// assert_eq!(creds.username(), "docs");
/// assert!(creds.has_password());
/// assert!(!format!("{:?}", creds).contains("secret"));
/// ```
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct Credentials {
    username: Zeroizing<String>,
    password: Zeroizing<Option<String>>,
}

impl Credentials {
    /// Creates new credentials with automatic memory zeroing.
    pub fn new(username: String, password: Option<String>) -> Self {
        Self {
            username: Zeroizing::new(username),
            password: Zeroizing::new(password),
        }
    }

    /// Gets the username.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Checks if password is present without exposing it.
    pub fn has_password(&self) -> bool {
        self.password.is_some()
    }

    /// Password for handing to a driver; empty when none was given.
    pub(crate) fn password(&self) -> &str {
        self.password.as_deref().unwrap_or_default()
    }

    /// Replaces the password, e.g. after an interactive prompt.
    pub fn with_password(mut self, password: String) -> Self {
        self.password = Zeroizing::new(Some(password));
        self
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username.as_str())
            .field("password", &self.password.is_some().then_some("****"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_new() {
        let creds = Credentials::new("testuser".to_string(), Some("testpass".to_string()));
        assert_eq!(creds.username(), "testuser");
        assert!(creds.has_password());
        assert_eq!(creds.password(), "testpass");
    }

    #[test]
    fn test_credentials_no_password() {
        let creds = Credentials::new("testuser".to_string(), None);
        assert!(!creds.has_password());
        assert_eq!(creds.password(), "");
    }

    #[test]
    fn test_credentials_with_password() {
        let creds = Credentials::new("testuser".to_string(), None).with_password("p".to_string());
        assert!(creds.has_password());
    }

    #[test]
    fn test_debug_redacts_password() {
        let creds = Credentials::new("user".to_string(), Some("hunter2".to_string()));
        let debug = format!("{:?}", creds);
        assert!(debug.contains("user"));
        assert!(!debug.contains("hunter2"));
    }
}
