use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};

use serde::{Deserialize, Deserializer, Serialize};

use crate::database::error::DatastoreError;

pub const POSTGRES_REQUIRED_KEYS: &[&str] = &["dbname", "user", "password", "host", "port"];

pub const SNOWFLAKE_REQUIRED_KEYS: &[&str] = &["user", "password", "account", "database", "warehouse"];

/// Connection settings for one datastore. Values are kept as strings so ports
/// and flags can be written either quoted or bare in YAML.
#[derive(Clone, Default, PartialEq, Eq, Serialize)]
pub struct Credentials(BTreeMap<String, String>);

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Like `get`, but a missing key is a configuration error.
    pub fn required(&self, key: &str) -> Result<&str, DatastoreError> {
        self.get(key).ok_or_else(|| {
            DatastoreError::Configuration(format!("required credential {} is missing", key))
        })
    }

    /// Fails with every missing key listed before any connection is attempted.
    pub fn require(&self, dialect: &str, keys: &[&str]) -> Result<(), DatastoreError> {
        let missing: Vec<&str> = keys.iter().copied().filter(|key| self.get(key).is_none()).collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(DatastoreError::Configuration(format!(
                "required params for {} connection not included in credentials: {}",
                dialect,
                missing.join(", ")
            )))
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Credentials {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Credentials(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let redacted: BTreeMap<&str, &str> = self
            .0
            .iter()
            .map(|(key, value)| {
                let shown = if key.contains("password") || key.contains("secret") {
                    "********"
                } else {
                    value.as_str()
                };
                (key.as_str(), shown)
            })
            .collect();
        f.debug_tuple("Credentials").field(&redacted).finish()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CredentialValue {
    Text(String),
    Integer(i64),
    Bool(bool),
}

impl<'de> Deserialize<'de> for Credentials {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, CredentialValue>::deserialize(deserializer)?;
        Ok(Credentials(
            raw.into_iter()
                .map(|(key, value)| {
                    let value = match value {
                        CredentialValue::Text(text) => text,
                        CredentialValue::Integer(number) => number.to_string(),
                        CredentialValue::Bool(flag) => flag.to_string(),
                    };
                    (key, value)
                })
                .collect(),
        ))
    }
}
