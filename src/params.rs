// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 statpipe contributors

//! Step parameters
//!
//! An ordered, case-insensitive key→value map. A value is a single
//! string until the same key is appended again, at which point it is
//! promoted to an ordered list. Callers pattern-match on [`ParamValue`]
//! instead of probing runtime types.

use serde::Serialize;

/// A parameter value: one string, or an ordered list when the key repeats
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Single(String),
    Multi(Vec<String>),
}

impl ParamValue {
    /// The value as a single string, if it is one
    pub fn as_single(&self) -> Option<&str> {
        match self {
            Self::Single(s) => Some(s),
            Self::Multi(_) => None,
        }
    }

    /// The value as an ordered slice; a single value is a slice of one
    pub fn as_slice(&self) -> Vec<&str> {
        match self {
            Self::Single(s) => vec![s.as_str()],
            Self::Multi(v) => v.iter().map(String::as_str).collect(),
        }
    }

    /// The first element, which always exists
    pub fn first(&self) -> &str {
        match self {
            Self::Single(s) => s,
            Self::Multi(v) => v.first().map(String::as_str).unwrap_or(""),
        }
    }

    fn push(&mut self, value: String) {
        match self {
            Self::Single(s) => {
                *self = Self::Multi(vec![std::mem::take(s), value]);
            }
            Self::Multi(v) => v.push(value),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        Self::Single(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        Self::Single(s)
    }
}

impl From<Vec<String>> for ParamValue {
    fn from(v: Vec<String>) -> Self {
        Self::Multi(v)
    }
}

/// Ordered, case-insensitive parameter map
///
/// Keys keep the spelling of their first insertion; lookups ignore
/// case. Iteration yields entries in insertion order, which is what
/// keeps saved workflows reproducible.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParameterBag {
    entries: Vec<(String, ParamValue)>,
}

impl ParameterBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k.eq_ignore_ascii_case(key))
    }

    /// Whether a key is present (case-insensitive)
    pub fn contains(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    /// Look up a value by key (case-insensitive)
    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.position(key).map(|i| &self.entries[i].1)
    }

    /// Look up a single-string value; `None` for absent or Multi values
    pub fn get_single(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(ParamValue::as_single)
    }

    /// Set a key, overwriting any existing value
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) {
        let key = key.into();
        match self.position(&key) {
            Some(i) => self.entries[i].1 = value.into(),
            None => self.entries.push((key, value.into())),
        }
    }

    /// Append a value: a fresh key stores a Single, a repeated key
    /// accumulates into an ordered Multi
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        match self.position(&key) {
            Some(i) => self.entries[i].1.push(value.into()),
            None => self.entries.push((key, ParamValue::Single(value.into()))),
        }
    }

    /// Insert a key only if absent; returns whether it was inserted
    pub fn set_if_absent(
        &mut self,
        key: impl Into<String>,
        value: impl Into<ParamValue>,
    ) -> bool {
        let key = key.into();
        if self.contains(&key) {
            return false;
        }
        self.entries.push((key, value.into()));
        true
    }

    /// Iterate entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Flatten to `(key, value)` string pairs, one pair per Multi element
    ///
    /// This is the shape both persisted forms store.
    pub fn flat_pairs(&self) -> Vec<(&str, &str)> {
        let mut pairs = Vec::new();
        for (key, value) in self.iter() {
            match value {
                ParamValue::Single(s) => pairs.push((key, s.as_str())),
                ParamValue::Multi(v) => {
                    for s in v {
                        pairs.push((key, s.as_str()));
                    }
                }
            }
        }
        pairs
    }
}

impl<K: Into<String>, V: Into<ParamValue>> FromIterator<(K, V)> for ParameterBag {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut bag = Self::new();
        for (k, v) in iter {
            bag.set(k, v);
        }
        bag
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let mut bag = ParameterBag::new();
        bag.set("TableName", "t_data");

        assert_eq!(bag.get_single("tablename"), Some("t_data"));
        assert_eq!(bag.get_single("TABLENAME"), Some("t_data"));
        assert!(bag.contains("tableNAME"));
    }

    #[test]
    fn test_set_overwrites() {
        let mut bag = ParameterBag::new();
        bag.set("method", "log2");
        bag.set("Method", "ln");

        assert_eq!(bag.len(), 1);
        assert_eq!(bag.get_single("method"), Some("ln"));
    }

    #[test]
    fn test_append_promotes_to_multi() {
        let mut bag = ParameterBag::new();
        bag.append("column", "a");
        bag.append("column", "b");

        assert_eq!(
            bag.get("column"),
            Some(&ParamValue::Multi(vec!["a".into(), "b".into()]))
        );
        assert_eq!(bag.get_single("column"), None);
    }

    #[test]
    fn test_insertion_order_preserved() {
        let mut bag = ParameterBag::new();
        bag.set("source", "csv");
        bag.set("path", "a.csv");
        bag.set("tableName", "t_data");

        let keys: Vec<&str> = bag.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["source", "path", "tableName"]);
    }

    #[test]
    fn test_set_if_absent() {
        let mut bag = ParameterBag::new();
        bag.set("workDir", "/tmp/local");

        assert!(!bag.set_if_absent("WORKDIR", "/tmp/global"));
        assert!(bag.set_if_absent("rPath", "/usr/bin"));
        assert_eq!(bag.get_single("workDir"), Some("/tmp/local"));
        assert_eq!(bag.get_single("rPath"), Some("/usr/bin"));
    }

    #[test]
    fn test_flat_pairs_expand_multi() {
        let mut bag = ParameterBag::new();
        bag.set("table", "t1");
        bag.append("column", "a");
        bag.append("column", "b");

        assert_eq!(
            bag.flat_pairs(),
            vec![("table", "t1"), ("column", "a"), ("column", "b")]
        );
    }
}
