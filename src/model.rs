use std::collections::HashMap;
use std::path::PathBuf;

/// A resolved value in an [`EnvMap`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvValue {
    /// A concrete string value.
    Present(String),
    /// The key was declared with an empty value on a `$optional` line.
    Absent,
}

impl EnvValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Present(value) => Some(value),
            Self::Absent => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

/// A parsed `KEY=VALUE` entry from a `.env` file or input buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: String,
    pub value: EnvValue,
    pub source: Option<PathBuf>,
    /// 1-based line of the assignment that produced the current value.
    pub line: u32,
}

/// Ordered key-value mapping produced by the parser.
///
/// Keys keep the position of their first assignment; a later assignment of
/// the same key replaces the entry in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvMap {
    entries: Vec<Entry>,
    by_key: HashMap<String, usize>,
}

impl EnvMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry, replacing any existing entry with the same key.
    pub fn insert(&mut self, entry: Entry) {
        if let Some(existing_idx) = self.by_key.get(&entry.key).copied() {
            self.entries[existing_idx] = entry;
        } else {
            self.by_key.insert(entry.key.clone(), self.entries.len());
            self.entries.push(entry);
        }
    }

    pub fn entry(&self, key: &str) -> Option<&Entry> {
        self.by_key.get(key).map(|idx| &self.entries[*idx])
    }

    pub fn get(&self, key: &str) -> Option<&EnvValue> {
        self.entry(key).map(|entry| &entry.value)
    }

    /// Concrete value for `key`, or `None` when missing or absent.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(EnvValue::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.by_key.contains_key(key)
    }

    pub(crate) fn value_mut(&mut self, key: &str) -> Option<&mut EnvValue> {
        let idx = self.by_key.get(key).copied()?;
        Some(&mut self.entries[idx].value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Entry> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.key.as_str())
    }

    /// Merge `other` into `self` key by key, later entries winning.
    pub fn merge(&mut self, other: EnvMap) {
        for entry in other.entries {
            self.insert(entry);
        }
    }
}

impl IntoIterator for EnvMap {
    type Item = Entry;
    type IntoIter = std::vec::IntoIter<Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a EnvMap {
    type Item = &'a Entry;
    type IntoIter = std::slice::Iter<'a, Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl FromIterator<Entry> for EnvMap {
    fn from_iter<I: IntoIterator<Item = Entry>>(iter: I) -> Self {
        let mut map = Self::new();
        for entry in iter {
            map.insert(entry);
        }
        map
    }
}

/// Summary of the load operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadReport {
    pub loaded: usize,
    pub skipped_existing: usize,
    /// Optional keys that resolved to no value and were not written.
    pub skipped_absent: usize,
    pub files_read: usize,
}

/// Result of [`EnvLoader::load`](crate::EnvLoader::load).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoadedEnv {
    pub env: EnvMap,
    pub report: LoadReport,
    pub files: Vec<PathBuf>,
}

/// Encoding choice for input data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// UTF-8 text input. A leading byte order mark is ignored.
    #[default]
    Utf8,
    /// ISO-8859-1, every byte maps to the code point of the same value.
    Latin1,
}

/// How `${KEY}` references are resolved once the file has been scanned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolutionMode {
    /// Resolve every reference against final values, following chains of
    /// any depth and rejecting cycles.
    #[default]
    Graph,
    /// Substitute already-defined keys while scanning and patch forward
    /// references afterwards from a LIFO work list. Chains whose links are
    /// all declared after their users may be left partially unresolved.
    Deferred,
}
