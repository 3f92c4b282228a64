use serde::{Deserialize, Serialize};

use crate::KeyValue;

/// Environment variables declared for a service.
///
/// Stored as an ordered list of assignments and serialized as a transparent array.
/// Lookup order is irrelevant to callers: a later assignment of the same key overrides earlier ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceEnv(pub Vec<KeyValue>);

impl ServiceEnv {
    /// Create an empty environment.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Create an environment containing a single key–value pair.
    pub fn single<K, V>(key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self(vec![KeyValue::new(key, value)])
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &KeyValue> {
        self.0.iter()
    }

    /// Get the value for a key, returning the last matching entry.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .rev()
            .find(|kv| kv.key() == key)
            .map(|kv| kv.value())
    }

    /// Append a key–value pair.
    ///
    /// Later entries override earlier ones when queried via [`ServiceEnv::get`].
    pub fn push<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.0.push(KeyValue::new(key, value));
    }

    /// Drop every assignment (`Environment=` with an empty value).
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Merge two environments, where entries from `other` override earlier ones.
    pub fn merged(&self, other: &ServiceEnv) -> ServiceEnv {
        let mut out = self.0.clone();
        out.extend(other.0.iter().cloned());
        ServiceEnv(out)
    }

    /// Collapse overridden assignments, keeping the first-seen key order.
    pub fn resolved(&self) -> Vec<(&str, &str)> {
        let mut out: Vec<(&str, &str)> = Vec::with_capacity(self.0.len());
        for kv in &self.0 {
            match out.iter_mut().find(|(k, _)| *k == kv.key()) {
                Some(slot) => slot.1 = kv.value(),
                None => out.push((kv.key(), kv.value())),
            }
        }
        out
    }
}

impl Default for ServiceEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<KeyValue> for ServiceEnv {
    fn from_iter<I: IntoIterator<Item = KeyValue>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
