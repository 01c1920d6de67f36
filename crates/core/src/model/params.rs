//! Ordered column → value mapping for a single CSV row.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Parameters handed to the executor for one job.
///
/// Iteration order is the CSV column order. Serializes as a JSON object whose
/// keys keep that order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobParams {
    entries: Vec<(String, String)>,
}

impl JobParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value. An existing key keeps its position and gets the new value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for JobParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = JobParams::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

impl Serialize for JobParams {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

struct JobParamsVisitor;

impl<'de> Visitor<'de> for JobParamsVisitor {
    type Value = JobParams;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of column names to string values")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut params = JobParams::new();
        while let Some((key, value)) = access.next_entry::<String, String>()? {
            params.insert(key, value);
        }
        Ok(params)
    }
}

impl<'de> Deserialize<'de> for JobParams {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(JobParamsVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_preserves_order() {
        let mut params = JobParams::new();
        params.insert("zeta", "1");
        params.insert("alpha", "2");
        params.insert("mid", "3");
        assert_eq!(params.keys().collect::<Vec<_>>(), vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_insert_existing_key_keeps_position() {
        let mut params: JobParams = [("a", "1"), ("b", "2")].into_iter().collect();
        params.insert("a", "updated");
        assert_eq!(params.len(), 2);
        assert_eq!(params.get("a"), Some("updated"));
        assert_eq!(params.keys().next(), Some("a"));
    }

    #[test]
    fn test_json_keeps_column_order() {
        let params: JobParams = [("url", "https://example.com"), ("account", "acme")]
            .into_iter()
            .collect();
        let json = serde_json::to_string(&params).unwrap();
        assert_eq!(json, r#"{"url":"https://example.com","account":"acme"}"#);

        let parsed: JobParams = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.keys().collect::<Vec<_>>(), vec!["url", "account"]);
    }
}
