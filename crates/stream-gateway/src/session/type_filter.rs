//! Client-controlled event-type filter, applied at write time.
//!
//! The session reads it on every outbound event and the control path
//! replaces it when the client sends `{"subscribe": [...]}`. An explicitly
//! empty set allows nothing: clients opt in to types, never out.

use parking_lot::RwLock;
use std::collections::HashSet;

/// Set of event types the server will stream to clients of one bus.
pub type AllowedTypes = HashSet<String>;

/// Build the server-side allowed set: `types` minus anything disabled.
pub fn allowed_types(types: &[&str], disabled: &[String]) -> AllowedTypes {
    types
        .iter()
        .filter(|t| !disabled.iter().any(|d| d.as_str() == **t))
        .map(|t| (*t).to_string())
        .collect()
}

#[derive(Debug)]
pub struct TypeFilter {
    enabled: bool,
    allow: RwLock<HashSet<String>>,
}

impl TypeFilter {
    /// Starts out allowing everything the server allows.
    pub fn new(initial: &AllowedTypes) -> Self {
        Self {
            enabled: true,
            allow: RwLock::new(initial.clone()),
        }
    }

    /// Allows every type; `set` has no effect.
    pub fn passthrough() -> Self {
        Self {
            enabled: false,
            allow: RwLock::new(HashSet::new()),
        }
    }

    pub fn allows(&self, event_type: &str) -> bool {
        if !self.enabled {
            return true;
        }
        self.allow.read().contains(event_type)
    }

    /// Replace the allow-set with `requested ∩ server_allowed`.
    ///
    /// Unknown or disallowed names are dropped without complaint. Returns the
    /// size of the new set.
    pub fn set<S: AsRef<str>>(&self, requested: &[S], server_allowed: &AllowedTypes) -> usize {
        let next: HashSet<String> = requested
            .iter()
            .map(|t| -> &str { t.as_ref() })
            .filter(|t| server_allowed.contains(*t))
            .map(str::to_string)
            .collect();
        let len = next.len();
        *self.allow.write() = next;
        len
    }

    /// Current allow-set, sorted.
    pub fn snapshot(&self) -> Vec<String> {
        let mut types: Vec<String> = self.allow.read().iter().cloned().collect();
        types.sort_unstable();
        types
    }
}
