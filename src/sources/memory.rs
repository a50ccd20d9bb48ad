use std::collections::BTreeMap;

use super::ConfigSource;

/// In-memory [`ConfigSource`], keyed by group then entry name.
///
/// Groups are reported in insertion order.
#[derive(Clone, Debug, Default)]
pub struct MemorySource {
    order: Vec<String>,
    groups: BTreeMap<String, BTreeMap<String, String>>,
}

impl MemorySource {
    /// Creates an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or extends) `group` with the given entries.
    pub fn with_group<K, V>(mut self, group: &str, entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.set_group(group, entries);
        self
    }

    /// In-place version of [`MemorySource::with_group`].
    pub fn set_group<K, V>(&mut self, group: &str, entries: impl IntoIterator<Item = (K, V)>)
    where
        K: Into<String>,
        V: Into<String>,
    {
        if !self.groups.contains_key(group) {
            self.order.push(group.to_string());
        }
        let map = self.groups.entry(group.to_string()).or_default();
        for (k, v) in entries {
            map.insert(k.into(), v.into());
        }
    }
}

impl ConfigSource for MemorySource {
    fn groups(&self) -> Vec<String> {
        self.order.clone()
    }

    fn read_entry(&self, group: &str, key: &str) -> Option<String> {
        self.groups.get(group)?.get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_keep_definition_order() {
        let src = MemorySource::new()
            .with_group("zeta", [("Lazy", "true")])
            .with_group("alpha", [("KeepAlive", "1")])
            .with_group("zeta", [("Socket", "/tmp/z")]);
        assert_eq!(src.groups(), vec!["zeta".to_string(), "alpha".to_string()]);
        assert_eq!(src.read_entry("zeta", "Socket").as_deref(), Some("/tmp/z"));
    }

    #[test]
    fn bool_entries() {
        let src = MemorySource::new().with_group(
            "svc",
            [("A", "true"), ("B", "Yes"), ("C", "0"), ("D", "bogus")],
        );
        assert!(src.read_bool_entry("svc", "A"));
        assert!(src.read_bool_entry("svc", "B"));
        assert!(!src.read_bool_entry("svc", "C"));
        assert!(!src.read_bool_entry("svc", "D"));
        assert!(!src.read_bool_entry("svc", "missing"));
        assert!(!src.read_bool_entry("nope", "A"));
    }
}
