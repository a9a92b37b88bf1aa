use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Wraps an e-mail address so that `Debug` and `Display` only reveal its shape.
///
/// Serialization still emits the real value: API responses need it, log lines do not.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Masked<T>(pub T);

impl<T: AsRef<str>> Masked<T> {
    fn redacted(&self) -> String {
        let value = self.0.as_ref();
        match value.split_once('@') {
            Some((local, domain)) => {
                let first = local.chars().next().map(String::from).unwrap_or_default();
                format!("{first}***@{domain}")
            }
            None => "********".to_string(),
        }
    }
}

impl<T: AsRef<str>> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.redacted())
    }
}

impl<T: AsRef<str>> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.redacted())
    }
}

impl<T: Serialize> Serialize for Masked<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<T> Masked<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_is_redacted_in_logs() {
        let email = Masked("pasajero@duocuc.cl".to_string());
        assert_eq!(email.to_string(), "p***@duocuc.cl");
        assert_eq!(format!("{:?}", email), "p***@duocuc.cl");
    }

    #[test]
    fn test_non_email_is_fully_hidden() {
        assert_eq!(Masked("none").to_string(), "********");
    }

    #[test]
    fn test_serialization_keeps_value() {
        let json = serde_json::to_string(&Masked("a@b.cl")).unwrap();
        assert_eq!(json, "\"a@b.cl\"");
    }
}
