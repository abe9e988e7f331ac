use std::collections::BTreeMap;

use crate::error::Error;

/// Where [`EnvLoader::load`](crate::EnvLoader::load) writes resolved values.
///
/// The in-memory sink is the default. The process sink is only reachable
/// through the `unsafe` [`TargetEnv::process`] constructor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetEnv {
    sink: Sink,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Sink {
    Process,
    Memory(BTreeMap<String, String>),
}

impl Default for TargetEnv {
    fn default() -> Self {
        Self::memory()
    }
}

impl TargetEnv {
    /// Sink backed by the process environment.
    ///
    /// # Safety
    ///
    /// Writes go through [`std::env::set_var`]. No other thread may read or
    /// write the process environment while a loader holding this sink runs.
    pub unsafe fn process() -> Self {
        Self {
            sink: Sink::Process,
        }
    }

    pub fn memory() -> Self {
        Self::from_memory(BTreeMap::new())
    }

    /// In-memory sink that starts with `map` as the existing environment.
    pub fn from_memory(map: BTreeMap<String, String>) -> Self {
        Self {
            sink: Sink::Memory(map),
        }
    }

    pub fn is_process(&self) -> bool {
        matches!(self.sink, Sink::Process)
    }

    pub fn as_memory(&self) -> Option<&BTreeMap<String, String>> {
        match &self.sink {
            Sink::Memory(map) => Some(map),
            Sink::Process => None,
        }
    }

    pub fn as_memory_mut(&mut self) -> Option<&mut BTreeMap<String, String>> {
        match &mut self.sink {
            Sink::Memory(map) => Some(map),
            Sink::Process => None,
        }
    }

    pub fn into_memory(self) -> Option<BTreeMap<String, String>> {
        match self.sink {
            Sink::Memory(map) => Some(map),
            Sink::Process => None,
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        match &self.sink {
            Sink::Process => std::env::var_os(key).is_some(),
            Sink::Memory(map) => map.contains_key(key),
        }
    }

    pub fn get_var(&self, key: &str) -> Option<String> {
        match &self.sink {
            Sink::Process => {
                std::env::var_os(key).map(|value| value.to_string_lossy().into_owned())
            }
            Sink::Memory(map) => map.get(key).cloned(),
        }
    }

    /// Reject a pair that [`TargetEnv::set_var`] could not store.
    ///
    /// The process environment cannot hold NUL bytes, nor `=` in a key;
    /// the in-memory sink accepts anything.
    pub(crate) fn check_var(&self, key: &str, value: &str) -> Result<(), Error> {
        if !self.is_process() {
            return Ok(());
        }

        let reason = if key.contains('\0') {
            "key contains a NUL byte"
        } else if key.contains('=') {
            "key contains '='"
        } else if value.contains('\0') {
            "value contains a NUL byte"
        } else {
            return Ok(());
        };
        Err(Error::UnsupportedEntry {
            key: key.to_owned(),
            reason,
        })
    }

    /// Callers run [`TargetEnv::check_var`] on every pair first.
    pub(crate) fn set_var(&mut self, key: &str, value: &str) {
        match &mut self.sink {
            // SAFETY: `TargetEnv::process` is unsafe and its caller promised
            // exclusive access to the process environment.
            Sink::Process => unsafe { std::env::set_var(key, value) },
            Sink::Memory(map) => {
                map.insert(key.to_owned(), value.to_owned());
            }
        }
    }
}
