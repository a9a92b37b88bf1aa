use carpool_shared::Masked;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IdentityError {
    #[error("not an e-mail address: {0}")]
    InvalidEmail(String),
}

/// The authenticated caller, resolved once per session and passed explicitly
/// into every engine call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PassengerIdentity {
    email: String,
}

/// Canonical form of an e-mail address for comparisons and storage.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

impl PassengerIdentity {
    pub fn new(email: impl Into<String>) -> Result<Self, IdentityError> {
        let email = normalize_email(&email.into());
        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(Self { email }),
            _ => Err(IdentityError::InvalidEmail(email)),
        }
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    /// Log-safe rendering of the e-mail.
    pub fn masked(&self) -> Masked<&str> {
        Masked(self.email.as_str())
    }
}
