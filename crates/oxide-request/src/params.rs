//! Captured URL parameters.

use std::collections::HashMap;

use serde::Serialize;

/// Named values captured by `$Variable` pattern segments.
///
/// A value is `None` when an optional variable had no URL segment to capture.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Params {
    params: HashMap<String, Option<String>>,
}

impl Params {
    /// Creates an empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a captured value, replacing any previous one.
    pub fn insert(&mut self, key: impl Into<String>, value: Option<String>) {
        self.params.insert(key.into(), value);
    }

    /// Gets a parameter value.
    ///
    /// Returns `None` both for unknown names and for names captured without
    /// a value; use [`Params::contains`] to tell them apart.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Option::as_deref)
    }

    /// Returns whether the name was captured at all.
    pub fn contains(&self, key: &str) -> bool {
        self.params.contains_key(key)
    }

    /// Parses a parameter as a specific type.
    pub fn parse<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    /// Number of captured names.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Returns true if nothing was captured.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Returns an iterator over the parameters.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.params
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_deref()))
    }

    /// Folds `other` into this set without letting blanks erase values.
    ///
    /// A name already present is only overwritten by a non-empty value.
    pub(crate) fn merge_non_empty(&mut self, other: &Self) {
        for (key, value) in &other.params {
            let has_value = value.as_deref().is_some_and(|v| !v.is_empty());
            if has_value || !self.params.contains_key(key) {
                self.params.insert(key.clone(), value.clone());
            }
        }
    }
}

/// The result of a successful pattern match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    /// The pattern matched but declared no variables.
    Matched,
    /// The pattern matched and captured these variables.
    Params(Params),
}

impl MatchOutcome {
    pub(crate) fn from_params(params: Params) -> Self {
        if params.is_empty() {
            Self::Matched
        } else {
            Self::Params(params)
        }
    }

    /// Returns the captured parameters, if any.
    pub fn params(&self) -> Option<&Params> {
        match self {
            Self::Matched => None,
            Self::Params(params) => Some(params),
        }
    }

    /// Looks up a single captured value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params().and_then(|p| p.get(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, Option<&str>)]) -> Params {
        let mut p = Params::new();
        for (k, v) in pairs {
            p.insert(*k, v.map(str::to_string));
        }
        p
    }

    #[test]
    fn test_get_and_contains() {
        let p = params(&[("ID", Some("5")), ("OtherID", None)]);
        assert_eq!(p.get("ID"), Some("5"));
        assert_eq!(p.parse::<u32>("ID"), Some(5));
        assert_eq!(p.get("OtherID"), None);
        assert!(p.contains("OtherID"));
        assert!(!p.contains("Missing"));
    }

    #[test]
    fn test_merge_keeps_existing_values() {
        let mut all = params(&[("ID", Some("5")), ("Action", Some("edit"))]);
        all.merge_non_empty(&params(&[("ID", None), ("Action", Some(""))]));
        assert_eq!(all.get("ID"), Some("5"));
        assert_eq!(all.get("Action"), Some("edit"));
    }

    #[test]
    fn test_merge_inserts_new_names_even_when_blank() {
        let mut all = Params::new();
        all.merge_non_empty(&params(&[("ID", None)]));
        assert!(all.contains("ID"));
        all.merge_non_empty(&params(&[("ID", Some("7"))]));
        assert_eq!(all.get("ID"), Some("7"));
    }

    #[test]
    fn test_merge_zero_is_a_value() {
        let mut all = params(&[("Page", Some("3"))]);
        all.merge_non_empty(&params(&[("Page", Some("0"))]));
        assert_eq!(all.get("Page"), Some("0"));
    }

    #[test]
    fn test_outcome_sentinel() {
        assert_eq!(MatchOutcome::from_params(Params::new()), MatchOutcome::Matched);
        let outcome = MatchOutcome::from_params(params(&[("ID", Some("1"))]));
        assert_eq!(outcome.get("ID"), Some("1"));
    }

    #[test]
    fn test_serialize_as_map() {
        let p = params(&[("ID", None)]);
        assert_eq!(serde_json::to_string(&p).unwrap(), r#"{"ID":null}"#);
    }
}
