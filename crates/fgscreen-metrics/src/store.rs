//! The [`MetricsStore`] key/value container.

use indexmap::IndexMap;
use std::fmt::Display;
use std::str::FromStr;

use crate::error::{MetricsError, Result};

/// Normalizes a metric key: surrounding whitespace is removed and the key is lower-cased.
///
/// # Example
/// ```
/// use fgscreen_metrics::normalize_key;
///
/// assert_eq!(normalize_key("  FastqScreen.Lane1.Undetermined.Read1 "), "fastqscreen.lane1.undetermined.read1");
/// ```
#[must_use]
pub fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase()
}

/// An insertion-ordered mapping of normalized keys to trimmed string values.
///
/// Values are stored as strings and decoded on read. Typed getters fail with
/// [`MetricsError::MissingKey`] when the key is absent and [`MetricsError::Parse`] when the
/// stored value does not decode; callers are expected to handle both rather than substitute a
/// default.
///
/// A later [`put`](Self::put) on an existing key silently replaces the value (last writer
/// wins) but keeps the key's original position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsStore {
    entries: IndexMap<String, String>,
}

impl MetricsStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the raw value for `key`, if present.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(&normalize_key(key)).map(String::as_str)
    }

    /// Returns true if `key` is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(&normalize_key(key))
    }

    /// Returns the raw value for `key` or a [`MetricsError::MissingKey`].
    pub fn get_required(&self, key: &str) -> Result<&str> {
        let normalized = normalize_key(key);
        self.entries
            .get(&normalized)
            .map(String::as_str)
            .ok_or(MetricsError::MissingKey { key: normalized })
    }

    fn parse_as<T: FromStr>(&self, key: &str, expected: &'static str) -> Result<T> {
        let value = self.get_required(key)?;
        value.parse::<T>().map_err(|_| MetricsError::Parse {
            key: normalize_key(key),
            value: value.to_string(),
            expected,
        })
    }

    /// Decodes the value for `key` as an `i32`.
    pub fn get_i32(&self, key: &str) -> Result<i32> {
        self.parse_as(key, "integer")
    }

    /// Decodes the value for `key` as an `i64`.
    pub fn get_i64(&self, key: &str) -> Result<i64> {
        self.parse_as(key, "long integer")
    }

    /// Decodes the value for `key` as a `u64`.
    pub fn get_u64(&self, key: &str) -> Result<u64> {
        self.parse_as(key, "unsigned integer")
    }

    /// Decodes the value for `key` as an `f32`.
    pub fn get_f32(&self, key: &str) -> Result<f32> {
        self.parse_as(key, "float")
    }

    /// Decodes the value for `key` as an `f64`.
    pub fn get_f64(&self, key: &str) -> Result<f64> {
        self.parse_as(key, "double")
    }

    /// Decodes the value for `key` as a boolean.
    ///
    /// Only `true` and `false` (in any letter case) are accepted.
    pub fn get_bool(&self, key: &str) -> Result<bool> {
        let value = self.get_required(key)?;
        if value.eq_ignore_ascii_case("true") {
            Ok(true)
        } else if value.eq_ignore_ascii_case("false") {
            Ok(false)
        } else {
            Err(MetricsError::Parse {
                key: normalize_key(key),
                value: value.to_string(),
                expected: "boolean",
            })
        }
    }

    /// Splits the value for `key` on commas, trimming items and dropping empty ones.
    pub fn get_list(&self, key: &str) -> Result<Vec<String>> {
        let value = self.get_required(key)?;
        Ok(value
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Stores `value` under the normalized `key`, replacing any previous value.
    pub fn put(&mut self, key: impl AsRef<str>, value: impl Display) {
        let value = value.to_string();
        self.entries.insert(normalize_key(key.as_ref()), value.trim().to_string());
    }

    /// Stores `items` joined with commas under `key`.
    pub fn put_list<I, S>(&mut self, key: impl AsRef<str>, items: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = items.into_iter().map(|s| s.as_ref().trim().to_string()).collect::<Vec<_>>();
        self.put(key, joined.join(","));
    }

    /// Copies every entry of `other` into this store (last writer wins).
    pub fn merge(&mut self, other: MetricsStore) {
        for (key, value) in other.entries {
            self.entries.insert(key, value);
        }
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over `(key, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Iterates over entries whose key starts with the normalized `prefix`.
    pub fn iter_prefix<'a>(&'a self, prefix: &str) -> impl Iterator<Item = (&'a str, &'a str)> {
        let prefix = normalize_key(prefix);
        self.iter().filter(move |(k, _)| k.starts_with(&prefix))
    }
}

impl<K: AsRef<str>, V: Display> FromIterator<(K, V)> for MetricsStore {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut store = MetricsStore::new();
        for (key, value) in iter {
            store.put(key, value);
        }
        store
    }
}
