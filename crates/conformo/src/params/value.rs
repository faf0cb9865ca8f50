//! Case parameter records.

use crate::result::{CtsError, CtsResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Prefix marking a param as private
///
/// Private params reach the test function but are excluded from case keys
/// and query strings.
pub const PRIVATE_PREFIX: char = '_';

/// One record of a param space: axis name to JSON value, in declaration order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaseParams(Map<String, Value>);

impl CaseParams {
    /// Empty record
    #[must_use]
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Build from a JSON value, which must be an object
    pub fn from_value(value: Value) -> CtsResult<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(CtsError::ParamType {
                axis: "<record>".to_string(),
                expected: "object",
                value: other.to_string(),
            }),
        }
    }

    /// Add a param, returning the extended record
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Whether a key is public
    #[must_use]
    pub fn is_public_key(key: &str) -> bool {
        !key.starts_with(PRIVATE_PREFIX)
    }

    /// Read a declared axis
    ///
    /// Fails with [`CtsError::UnknownAxis`] when the axis is absent, which is
    /// how filter and expand stages report reads of undeclared axes.
    pub fn get(&self, key: &str) -> CtsResult<&Value> {
        self.0.get(key).ok_or_else(|| CtsError::UnknownAxis {
            axis: key.to_string(),
            declared: self.0.keys().cloned().collect::<Vec<_>>().join(","),
        })
    }

    /// Read an axis that may be legitimately absent
    #[must_use]
    pub fn try_get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Read an unsigned integer axis
    pub fn u64(&self, key: &str) -> CtsResult<u64> {
        let value = self.get(key)?;
        value.as_u64().ok_or_else(|| type_error(key, "u64", value))
    }

    /// Read a signed integer axis
    pub fn i64(&self, key: &str) -> CtsResult<i64> {
        let value = self.get(key)?;
        value.as_i64().ok_or_else(|| type_error(key, "i64", value))
    }

    /// Read a numeric axis
    pub fn f64(&self, key: &str) -> CtsResult<f64> {
        let value = self.get(key)?;
        value.as_f64().ok_or_else(|| type_error(key, "f64", value))
    }

    /// Read a string axis
    pub fn str(&self, key: &str) -> CtsResult<&str> {
        let value = self.get(key)?;
        value.as_str().ok_or_else(|| type_error(key, "string", value))
    }

    /// Read a boolean axis
    pub fn bool(&self, key: &str) -> CtsResult<bool> {
        let value = self.get(key)?;
        value.as_bool().ok_or_else(|| type_error(key, "bool", value))
    }

    /// Whether the axis is present
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Axis names in declaration order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Entries in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of axes
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the record has no axes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Only the public axes
    #[must_use]
    pub fn public(&self) -> Self {
        Self(
            self.0
                .iter()
                .filter(|(k, _)| Self::is_public_key(k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// Compact JSON of the public axes, as used in case keys and queries
    #[must_use]
    pub fn key_string(&self) -> String {
        Value::Object(self.public().0).to_string()
    }

    /// Append another record's axes
    ///
    /// A key present in both is a [`CtsError::DuplicateParamKey`].
    pub fn merged(&self, other: &Self) -> CtsResult<Self> {
        let mut out = self.clone();
        for (key, value) in &other.0 {
            if out.0.contains_key(key) {
                return Err(CtsError::DuplicateParamKey { key: key.clone() });
            }
            out.0.insert(key.clone(), value.clone());
        }
        Ok(out)
    }

    /// Whether every public entry of `self` appears with an equal value in `other`
    #[must_use]
    pub fn is_subset_of(&self, other: &Self) -> bool {
        self.0
            .iter()
            .filter(|(k, _)| Self::is_public_key(k))
            .all(|(k, v)| other.0.get(k) == Some(v))
    }

    /// Borrow the underlying map
    #[must_use]
    pub const fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub(crate) fn insert(&mut self, key: String, value: Value) {
        self.0.insert(key, value);
    }
}

impl std::fmt::Display for CaseParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key_string())
    }
}

impl From<Map<String, Value>> for CaseParams {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

fn type_error(axis: &str, expected: &'static str, value: &Value) -> CtsError {
    CtsError::ParamType {
        axis: axis.to_string(),
        expected,
        value: value.to_string(),
    }
}
