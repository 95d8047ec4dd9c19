//! auth::errors
//!
//! Errors raised while turning a declared credential into an authenticator.
//!
//! # Design
//!
//! Error messages name the offending field but MUST NOT contain the secret
//! value itself (token, password, key material, passphrase).
//!
//! # Example
//!
//! ```
//! use gitconverge::auth::AuthConfigError;
//!
//! let err = AuthConfigError::Malformed {
//!     field: "ssh_key.private_key_pem",
//!     reason: "missing PEM header".to_string(),
//! };
//! assert!(err.to_string().contains("ssh_key.private_key_pem"));
//! ```

use thiserror::Error;

/// A declared credential is malformed or incomplete.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthConfigError {
    /// A required field is empty or absent.
    #[error("auth field '{field}' is required")]
    Missing {
        /// Dotted path of the field
        field: &'static str,
    },

    /// Two fields that exclude each other were both set.
    #[error("auth fields '{first}' and '{second}' are mutually exclusive")]
    Conflicting {
        /// Dotted path of the first field
        first: &'static str,
        /// Dotted path of the second field
        second: &'static str,
    },

    /// A field is present but its content cannot be used.
    #[error("auth field '{field}' is malformed: {reason}")]
    Malformed {
        /// Dotted path of the field
        field: &'static str,
        /// What is wrong with it (never the value)
        reason: String,
    },
}

impl AuthConfigError {
    /// The dotted path of the field at fault.
    pub fn field(&self) -> &'static str {
        match self {
            AuthConfigError::Missing { field } | AuthConfigError::Malformed { field, .. } => field,
            AuthConfigError::Conflicting { first, .. } => first,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_accessor() {
        let err = AuthConfigError::Conflicting {
            first: "ssh_key.private_key_pem",
            second: "ssh_key.private_key_path",
        };
        assert_eq!(err.field(), "ssh_key.private_key_pem");
        assert!(err.to_string().contains("mutually exclusive"));
    }

    #[test]
    fn missing_display() {
        let err = AuthConfigError::Missing {
            field: "bearer.token",
        };
        assert_eq!(err.to_string(), "auth field 'bearer.token' is required");
    }
}
