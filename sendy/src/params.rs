//! Ordered key-value pairs for headers and parameters.
//!
//! Builders accumulate pairs in call order and allow duplicates. When the
//! pairs are applied, a later pair replaces an earlier one with the same key.

use std::collections::BTreeMap;

/// A single HTTP header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Header name.
    pub key: String,
    /// Header value.
    pub value: String,
}

impl Header {
    /// Create a new header.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A single query or form parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    /// Parameter name.
    pub key: String,
    /// Parameter value.
    pub value: String,
}

impl Param {
    /// Create a new parameter.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Ordered list of parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(Vec<Param>);

impl Params {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a parameter.
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.push(Param::new(key, value));
    }

    /// Check if no parameter was added.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of accumulated parameters, duplicates included.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Param> {
        self.0.iter()
    }

    /// Encode as `application/x-www-form-urlencoded`.
    ///
    /// The last value set for a key wins and keys are emitted in sorted
    /// order, so the output does not depend on call order.
    pub fn encode(&self) -> String {
        let resolved: BTreeMap<&str, &str> = self
            .0
            .iter()
            .map(|p| (p.key.as_str(), p.value.as_str()))
            .collect();

        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(resolved)
            .finish()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| Param::new(k, v)).collect())
    }
}
