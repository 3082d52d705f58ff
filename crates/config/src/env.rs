//! Environment snapshot taken once at startup.
//!
//! Plugin eligibility and plugin configuration read from this snapshot
//! instead of the live process environment, so a variable changed while
//! the process runs has no effect until restart.

use std::collections::BTreeMap;

use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvSnapshot {
    values: BTreeMap<String, String>,
}

impl EnvSnapshot {
    /// Capture `keys` from the process environment. Entries in `overrides`
    /// win over the environment and are always included.
    pub fn capture<'a>(
        keys: impl IntoIterator<Item = &'a str>,
        overrides: &BTreeMap<String, String>,
    ) -> Self {
        let mut values: BTreeMap<String, String> = keys
            .into_iter()
            .filter_map(|key| {
                std::env::var(key)
                    .ok()
                    .filter(|v| !v.is_empty())
                    .map(|v| (key.to_string(), v))
            })
            .collect();
        for (key, value) in overrides {
            values.insert(key.clone(), value.clone());
        }
        debug!(keys = values.len(), "captured environment snapshot");
        Self { values }
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Keys from `required` that are not present.
    pub fn missing<'a>(&self, required: &'a [String]) -> Vec<&'a str> {
        required
            .iter()
            .filter(|key| !self.contains(key))
            .map(String::as_str)
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
