use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::DemandError;

/// Default prefix for generated demand ids.
pub const DEFAULT_ID_PREFIX: &str = "LOG";

/// A validated demand identifier of the form `PREFIX-YEAR-RANDOM8`,
/// e.g. `LOG-2025-3F9A0C12`.
///
/// The id doubles as the storage key, so parsing rejects anything that
/// could escape the storage directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DemandId(String);

impl DemandId {
    /// Generate a fresh id for the given prefix and year.
    pub fn generate(prefix: &str, year: i32) -> Self {
        let random = uuid::Uuid::new_v4().simple().to_string();
        Self(format!(
            "{}-{:04}-{}",
            prefix.to_ascii_uppercase(),
            year,
            random[..8].to_ascii_uppercase()
        ))
    }

    pub fn parse(raw: &str) -> Result<Self, DemandError> {
        let raw = raw.trim();
        let mut parts = raw.split('-');
        let (Some(prefix), Some(year), Some(random), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid(raw));
        };

        let prefix_ok = !prefix.is_empty()
            && prefix.len() <= 16
            && prefix
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit());
        let year_ok = year.len() == 4 && year.chars().all(|c| c.is_ascii_digit());
        let random_ok = random.len() == 8
            && random
                .chars()
                .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase());

        if prefix_ok && year_ok && random_ok {
            Ok(Self(raw.to_string()))
        } else {
            Err(invalid(raw))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn invalid(raw: &str) -> DemandError {
    DemandError::Validation(format!(
        "invalid demand id {raw:?}: expected PREFIX-YEAR-RANDOM8"
    ))
}

impl fmt::Display for DemandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for DemandId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for DemandId {
    type Err = DemandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DemandId {
    type Error = DemandError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DemandId> for String {
    fn from(id: DemandId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_parse_back() {
        let id = DemandId::generate("log", 2025);
        assert!(id.as_str().starts_with("LOG-2025-"));
        assert_eq!(id.as_str().len(), "LOG-2025-".len() + 8);
        assert_eq!(DemandId::parse(id.as_str()).unwrap(), id);
    }

    #[test]
    fn generated_ids_are_unique() {
        let a = DemandId::generate("LOG", 2025);
        let b = DemandId::generate("LOG", 2025);
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_path_like_ids() {
        assert!(DemandId::parse("../etc/passwd").is_err());
        assert!(DemandId::parse("LOG-2025-abc/../x").is_err());
        assert!(DemandId::parse("LOG-25-3F9A0C12").is_err());
        assert!(DemandId::parse("LOG-2025-3F9A0C1").is_err());
        assert!(DemandId::parse("").is_err());
    }

    #[test]
    fn deserialize_validates() {
        let ok: Result<DemandId, _> = serde_json::from_str("\"REQ-2024-0000ABCD\"");
        assert!(ok.is_ok());
        let bad: Result<DemandId, _> = serde_json::from_str("\"nope\"");
        assert!(bad.is_err());
    }
}
