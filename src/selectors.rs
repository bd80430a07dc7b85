//! Registration entry selectors, in SPIRE's `type:value` form.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Selector type marking an entry whose identity may be persisted by SVID
/// store plugins.
pub const SVID_STORE_TYPE: &str = "svidstore";

/// A single selector, e.g. `unix:uid:1000` or `svidstore:type:aws_secretsmanager`.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Selector {
    selector_type: String,
    value: String,
}

/// Error returned when a selector string has no `type:` prefix.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
#[error("selector must be of the form type:value: {0:?}")]
pub struct SelectorParseError(String);

impl Selector {
    /// Creates a selector from its type and value.
    pub fn new(selector_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            selector_type: selector_type.into(),
            value: value.into(),
        }
    }

    /// Returns the selector type, e.g. `unix`.
    pub fn selector_type(&self) -> &str {
        &self.selector_type
    }

    /// Returns the selector value, e.g. `uid:1000`.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Returns `true` if this selector carries the storage-capability marker.
    ///
    /// The type is compared case-insensitively.
    pub fn is_svid_store(&self) -> bool {
        self.selector_type.eq_ignore_ascii_case(SVID_STORE_TYPE)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.selector_type, self.value)
    }
}

impl FromStr for Selector {
    type Err = SelectorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((t, v)) if !t.is_empty() => Ok(Selector::new(t, v)),
            _ => Err(SelectorParseError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_splits_on_first_colon() {
        let selector: Selector = "unix:uid:1000".parse().unwrap();
        assert_eq!(selector.selector_type(), "unix");
        assert_eq!(selector.value(), "uid:1000");
        assert_eq!(selector.to_string(), "unix:uid:1000");
    }

    #[test]
    fn test_parse_rejects_missing_type() {
        assert!("uid".parse::<Selector>().is_err());
        assert!(":uid".parse::<Selector>().is_err());
    }

    #[test]
    fn test_is_svid_store_ignores_case() {
        assert!(Selector::new("svidstore", "type:aws").is_svid_store());
        assert!(Selector::new("SVIDStore", "type:aws").is_svid_store());
        assert!(!Selector::new("unix", "uid:0").is_svid_store());
    }
}
