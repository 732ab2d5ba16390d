//! Secure credential container with automatic memory zeroing.
//!
//! # Security
//! - Credentials are stored in `Zeroizing<T>` containers
//! - Memory is cleared when credentials go out of scope
//! - The password never appears in `Debug` output

use std::fmt;
use zeroize::Zeroizing;

/// SQL Server login that zeros its memory on drop.
///
/// # Example
///
/// ```rust
/// use tabledump_core::security::Credentials;
///
/// let creds = Credentials::new("sa".to_string(), "secret".to_string());
/// assert_eq!(creds.username(), "sa");
/// assert!(!format!("{creds:?}").contains("secret"));
/// ```
#[derive(Clone)]
pub struct Credentials {
    username: Zeroizing<String>,
    password: Zeroizing<String>,
}

impl Credentials {
    /// Creates new credentials.
    pub fn new(username: String, password: String) -> Self {
        Self {
            username: Zeroizing::new(username),
            password: Zeroizing::new(password),
        }
    }

    /// Gets the login name.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Gets the password for handing to the driver.
    ///
    /// Never log the returned value.
    pub fn password(&self) -> &str {
        &self.password
    }

    /// Checks if a non-empty password is present without exposing it.
    pub fn has_password(&self) -> bool {
        !self.password.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username.as_str())
            .field("password", &"****")
            .finish()
    }
}
