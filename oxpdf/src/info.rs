//! Cascading key-value metadata.
//!
//! An [`Info`] stores string entries for one scope (member, set, or global).
//! Lookup cascades member -> set -> global configuration; writes are always
//! local to the queried scope. The global configuration is discovered once
//! on the search path (`oxpdf.conf`) and is immutable afterwards.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use once_cell::sync::Lazy;

use super::error::{Error, Result};
use super::paths;

static CONFIG: Lazy<Info> = Lazy::new(|| {
    paths::find_file("oxpdf.conf")
        .and_then(|path| Info::load(&path).ok())
        .unwrap_or_default()
});

/// The global configuration scope, populated once from `oxpdf.conf` if that
/// file exists on the search path.
pub fn config() -> &'static Info {
    &CONFIG
}

/// A keyed string store with member -> set -> global lookup cascade.
#[derive(Debug, Clone, Default)]
pub struct Info {
    entries: BTreeMap<String, String>,
    fallback: Option<Arc<Info>>,
}

impl Info {
    /// An empty store with no fallback scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the leading YAML document of `path` into a new store.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|err| {
            let path = path.display().to_string();
            if err.kind() == std::io::ErrorKind::NotFound {
                Error::FileNotFound { path }
            } else {
                Error::ReadFailure {
                    path,
                    reason: err.to_string(),
                }
            }
        })?;
        Self::from_yaml_str(&content).map_err(|err| match err {
            Error::ReadFailure { reason, .. } => Error::ReadFailure {
                path: path.display().to_string(),
                reason,
            },
            other => other,
        })
    }

    /// Parses the leading YAML document of `content` into a new store.
    ///
    /// Reading stops at the first `---` separator, so a full member data
    /// file can be passed as-is.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let mut doc = String::new();
        for line in content.lines() {
            if line.trim() == "---" {
                break;
            }
            doc.push_str(line);
            doc.push('\n');
        }

        let mut info = Self::new();
        if doc.trim().is_empty() {
            return Ok(info);
        }
        let mapping: serde_yaml::Mapping =
            serde_yaml::from_str(&doc).map_err(|err| Error::ReadFailure {
                path: "<yaml>".to_string(),
                reason: err.to_string(),
            })?;
        for (key, value) in &mapping {
            let key = yaml_scalar_to_string(key);
            info.entries.insert(key, yaml_value_to_string(value));
        }
        Ok(info)
    }

    /// Returns this store with `parent` installed as its fallback scope.
    pub fn with_fallback(mut self, parent: Arc<Self>) -> Self {
        self.fallback = Some(parent);
        self
    }

    /// Whether `key` resolves at any cascade level, including the global
    /// configuration.
    pub fn has_key(&self, key: &str) -> bool {
        self.lookup(key).is_some() || config().lookup(key).is_some()
    }

    /// Whether `key` is defined in this scope specifically.
    pub fn has_key_local(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Resolves `key` through the cascade, ending at the global
    /// configuration.
    pub fn entry(&self, key: &str) -> Result<&str> {
        self.lookup(key)
            .or_else(|| config().lookup(key))
            .ok_or_else(|| Error::MetadataMissing {
                key: key.to_string(),
            })
    }

    /// Resolves `key`, falling back to `default` when it is nowhere defined.
    pub fn entry_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.entry(key).unwrap_or(default)
    }

    /// Resolves `key` and parses it as `T`.
    pub fn entry_as<T: FromStr>(&self, key: &str) -> Result<T> {
        let raw = self.entry(key)?;
        raw.trim().parse().map_err(|_| Error::MetadataBadType {
            key: key.to_string(),
            expected: std::any::type_name::<T>(),
        })
    }

    /// Like [`Info::entry_as`], but a missing key yields `default` while a
    /// malformed value still fails.
    pub fn entry_as_or<T: FromStr>(&self, key: &str, default: T) -> Result<T> {
        match self.entry_as(key) {
            Ok(value) => Ok(value),
            Err(Error::MetadataMissing { .. }) => Ok(default),
            Err(err) => Err(err),
        }
    }

    /// Resolves `key` and parses it as a list of `T`.
    ///
    /// Accepts a YAML flow sequence (`[a, b, c]`) or plain comma/whitespace
    /// separated values.
    pub fn entry_list<T: FromStr>(&self, key: &str) -> Result<Vec<T>> {
        let raw = self.entry(key)?.trim();
        let raw = raw
            .strip_prefix('[')
            .and_then(|s| s.strip_suffix(']'))
            .unwrap_or(raw);
        let items: Vec<&str> = if raw.contains(',') {
            raw.split(',').map(str::trim).collect()
        } else {
            raw.split_whitespace().collect()
        };
        items
            .into_iter()
            .filter(|item| !item.is_empty())
            .map(|item| {
                item.parse().map_err(|_| Error::MetadataBadType {
                    key: key.to_string(),
                    expected: std::any::type_name::<T>(),
                })
            })
            .collect()
    }

    /// Writes an entry into this scope; the fallback scopes are never
    /// touched.
    pub fn set_entry(&mut self, key: &str, value: impl Display) {
        self.entries.insert(key.to_string(), value.to_string());
    }

    /// Iterates over the entries of this scope only, in key order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn lookup(&self, key: &str) -> Option<&str> {
        if let Some(value) = self.entries.get(key) {
            return Some(value);
        }
        self.fallback.as_ref().and_then(|parent| parent.lookup(key))
    }
}

fn yaml_scalar_to_string(value: &serde_yaml::Value) -> String {
    match value {
        serde_yaml::Value::String(s) => s.clone(),
        other => yaml_value_to_string(other),
    }
}

/// Renders a YAML value back to the flat string form kept in the store.
/// Sequences keep the flow syntax so list-valued entries round-trip.
fn yaml_value_to_string(value: &serde_yaml::Value) -> String {
    match value {
        serde_yaml::Value::Null => String::new(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::String(s) => s.clone(),
        serde_yaml::Value::Sequence(seq) => {
            let items: Vec<String> = seq.iter().map(yaml_value_to_string).collect();
            format!("[{}]", items.join(", "))
        }
        other => serde_yaml::to_string(other)
            .unwrap_or_default()
            .trim_end()
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_yaml_str() {
        let content = r"
SetDesc: A test set
NumMembers: 3
XMin: 1.0e-9
Flavors: [21, 1, -1]
AlphaS_Qs: [1.0, 2.0, 3.0]
---
0.1 0.5
";
        let info = Info::from_yaml_str(content).unwrap();
        assert_eq!(info.entry("SetDesc").unwrap(), "A test set");
        assert_eq!(info.entry_as::<u32>("NumMembers").unwrap(), 3);
        assert_eq!(info.entry_as::<f64>("XMin").unwrap(), 1e-9);
        assert_eq!(info.entry_list::<i32>("Flavors").unwrap(), vec![21, 1, -1]);
        assert_eq!(
            info.entry_list::<f64>("AlphaS_Qs").unwrap(),
            vec![1.0, 2.0, 3.0]
        );
        // The grid block after `---` is not part of the metadata.
        assert!(!info.has_key_local("0.1 0.5"));
    }

    #[test]
    fn test_cascade_precedence() {
        let mut set_info = Info::new();
        set_info.set_entry("ErrorType", "hessian");
        set_info.set_entry("NumMembers", 41);

        let mut member_info = Info::new().with_fallback(Arc::new(set_info));
        member_info.set_entry("PdfType", "error");
        member_info.set_entry("ErrorType", "replicas");

        // Local wins over the set scope; unshadowed set keys fall through.
        assert_eq!(member_info.entry("ErrorType").unwrap(), "replicas");
        assert_eq!(member_info.entry_as::<u32>("NumMembers").unwrap(), 41);
        assert_eq!(member_info.entry("PdfType").unwrap(), "error");
        assert!(matches!(
            member_info.entry("NoSuchKey"),
            Err(Error::MetadataMissing { .. })
        ));
    }

    #[test]
    fn test_writes_are_local() {
        let set_info = Arc::new(Info::new());
        let mut member_info = Info::new().with_fallback(Arc::clone(&set_info));
        member_info.set_entry("DataVersion", 2);
        assert!(member_info.has_key_local("DataVersion"));
        assert!(!set_info.has_key_local("DataVersion"));
    }

    #[test]
    fn test_typed_accessors() {
        let mut info = Info::new();
        info.set_entry("ForcePositive", 1);
        info.set_entry("MCharm", "not-a-number");

        assert_eq!(info.entry_as::<i64>("ForcePositive").unwrap(), 1);
        assert_eq!(info.entry_as_or::<i64>("Missing", 7).unwrap(), 7);
        assert!(matches!(
            info.entry_as::<f64>("MCharm"),
            Err(Error::MetadataBadType { .. })
        ));
        assert!(matches!(
            info.entry_as_or::<f64>("MCharm", 0.0),
            Err(Error::MetadataBadType { .. })
        ));
    }

    #[test]
    fn test_entry_list_forms() {
        let mut info = Info::new();
        info.set_entry("A", "[1, 2, 3]");
        info.set_entry("B", "1 2 3");
        info.set_entry("C", "4");
        assert_eq!(info.entry_list::<i32>("A").unwrap(), vec![1, 2, 3]);
        assert_eq!(info.entry_list::<i32>("B").unwrap(), vec![1, 2, 3]);
        assert_eq!(info.entry_list::<i32>("C").unwrap(), vec![4]);
    }
}
