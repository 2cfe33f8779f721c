use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::style;

/// Latest status for one host. Latest-only; a new poll replaces the
/// previous entry entirely.
#[derive(Debug, Clone)]
pub struct StatusEntry {
    pub raw_text: String,
    pub is_error: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Inner {
    order: Vec<String>,
    entries: HashMap<String, StatusEntry>,
}

/// Shared hostname -> latest-status map, insertion-ordered for
/// deterministic display. Writers update single keys; readers get a
/// point-in-time copy and never hold the lock past the copy.
#[derive(Debug, Default)]
pub struct HostStatusStore {
    inner: RwLock<Inner>,
}

impl HostStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites the entry for `hostname`, creating it (at the end of
    /// the display order) on first write.
    pub fn set(&self, hostname: &str, text: impl Into<String>, is_error: bool) {
        let mut inner = self.inner.write();
        if !inner.entries.contains_key(hostname) {
            inner.order.push(hostname.to_string());
        }
        inner.entries.insert(
            hostname.to_string(),
            StatusEntry {
                raw_text: text.into(),
                is_error,
                timestamp: Utc::now(),
            },
        );
    }

    /// Stores a one-line message prefixed with the white `(hostname)`
    /// label. Used for the loading placeholder and failure text.
    pub fn set_message(&self, hostname: &str, message: &str, is_error: bool) {
        let label = style::white(&format!("({hostname}) "));
        self.set(hostname, format!("{label}{message}\n"), is_error);
    }

    /// Stores a successful poll's full captured output. The trailing
    /// blank lines are the per-host block separator consumers split on.
    pub fn set_output(&self, hostname: &str, stdout: &str) {
        self.set(hostname, format!("{}\n\n\n\n", stdout.trim()), false);
    }

    pub fn entry(&self, hostname: &str) -> Option<StatusEntry> {
        self.inner.read().entries.get(hostname).cloned()
    }

    /// Insertion-ordered `(hostname, text)` pairs. Hosts outside `filter`
    /// and entries with empty text are skipped.
    pub fn snapshot(&self, filter: Option<&HashSet<String>>) -> Vec<(String, String)> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter(|host| filter.map_or(true, |f| f.contains(host.as_str())))
            .filter_map(|host| {
                let entry = inner.entries.get(host)?;
                if entry.raw_text.is_empty() {
                    return None;
                }
                Some((host.clone(), entry.raw_text.clone()))
            })
            .collect()
    }
}
