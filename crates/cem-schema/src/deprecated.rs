//! The polymorphic `deprecated` value.

use serde::{Deserialize, Serialize};

/// Either a boolean flag or a reason string; the JSON keeps whichever shape
/// the source used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Deprecated {
    Flag(bool),
    Reason(String),
}

impl Deprecated {
    /// A bare `@deprecated` with no reason.
    #[must_use]
    pub fn flag() -> Self {
        Self::Flag(true)
    }

    #[must_use]
    pub fn is_deprecated(&self) -> bool {
        match self {
            Self::Flag(flag) => *flag,
            Self::Reason(_) => true,
        }
    }
}

impl From<&str> for Deprecated {
    fn from(reason: &str) -> Self {
        if reason.is_empty() {
            Self::Flag(true)
        } else {
            Self::Reason(reason.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boolean_stays_boolean() {
        let value = serde_json::to_value(Deprecated::flag()).unwrap();
        assert_eq!(value, serde_json::json!(true));
    }

    #[test]
    fn reason_stays_string() {
        let value = serde_json::to_value(Deprecated::from("use heading")).unwrap();
        assert_eq!(value, serde_json::json!("use heading"));
    }

    #[test]
    fn roundtrips_both_shapes() {
        let flag: Deprecated = serde_json::from_str("false").unwrap();
        assert_eq!(flag, Deprecated::Flag(false));
        let reason: Deprecated = serde_json::from_str("\"gone\"").unwrap();
        assert_eq!(reason, Deprecated::Reason("gone".into()));
    }
}
