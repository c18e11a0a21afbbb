use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("Invalid config setting: `{0}` (expected `KEY=VALUE` or `KEY`)")]
pub struct ConfigSettingParseError(String);

/// A single `-C key=value` from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSettingEntry {
    /// The key of the setting. For example, given `key=value`, this would be `key`.
    key: String,
    /// The value of the setting. For example, given `key=value`, this would be `value`.
    ///
    /// A bare `key` has the empty string as value.
    value: String,
}

impl FromStr for ConfigSettingEntry {
    type Err = ConfigSettingParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (key, value) = s.split_once('=').unwrap_or((s, ""));
        let key = key.trim();
        if key.is_empty() {
            return Err(ConfigSettingParseError(s.to_string()));
        }
        Ok(Self {
            key: key.to_string(),
            value: value.trim().to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigSettingValue {
    /// The value consists of a single string.
    String(String),
    /// The value consists of a list of strings.
    List(Vec<String>),
}

/// Settings to pass to a PEP 517 build backend, structured as a map from (string) key to string or
/// list of strings.
///
/// Passed unchanged to every hook as `config_settings`.
///
/// See: <https://peps.python.org/pep-0517/#config-settings>
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSettings(BTreeMap<String, ConfigSettingValue>);

impl ConfigSettings {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&ConfigSettingValue> {
        self.0.get(key)
    }
}

impl FromIterator<ConfigSettingEntry> for ConfigSettings {
    /// Repeated keys accumulate into a list, in the order they were given.
    fn from_iter<T: IntoIterator<Item = ConfigSettingEntry>>(iter: T) -> Self {
        let mut config = BTreeMap::default();
        for entry in iter {
            match config.entry(entry.key) {
                Entry::Vacant(vacant) => {
                    vacant.insert(ConfigSettingValue::String(entry.value));
                }
                Entry::Occupied(mut occupied) => match occupied.get_mut() {
                    ConfigSettingValue::String(existing) => {
                        let existing = existing.clone();
                        occupied.insert(ConfigSettingValue::List(vec![existing, entry.value]));
                    }
                    ConfigSettingValue::List(existing) => {
                        existing.push(entry.value);
                    }
                },
            }
        }
        Self(config)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn entries(args: &[&str]) -> ConfigSettings {
        args.iter()
            .map(|arg| ConfigSettingEntry::from_str(arg).unwrap())
            .collect()
    }

    #[test]
    fn collect_config_settings() {
        let settings = entries(&["key=value", "key=value2", "list=value3", "list=value4"]);
        assert_eq!(
            settings.get("key"),
            Some(&ConfigSettingValue::List(vec![
                "value".to_string(),
                "value2".to_string()
            ]))
        );
        assert_eq!(
            settings.get("list"),
            Some(&ConfigSettingValue::List(vec![
                "value3".to_string(),
                "value4".to_string()
            ]))
        );
    }

    #[test]
    fn bare_key() {
        let settings = entries(&["--quiet", "a = b=c"]);
        assert_eq!(
            settings.get("--quiet"),
            Some(&ConfigSettingValue::String(String::new()))
        );
        assert_eq!(
            settings.get("a"),
            Some(&ConfigSettingValue::String("b=c".to_string()))
        );
    }

    #[test]
    fn empty_key() {
        let err = ConfigSettingEntry::from_str("=value").unwrap_err();
        insta::assert_snapshot!(err, @"Invalid config setting: `=value` (expected `KEY=VALUE` or `KEY`)");
    }

    #[test]
    fn to_json() {
        let settings = entries(&["key=Hello, \"world!\"", "list=1", "list=2"]);
        assert_eq!(
            serde_json::to_string(&settings).unwrap(),
            r#"{"key":"Hello, \"world!\"","list":["1","2"]}"#
        );
    }
}
