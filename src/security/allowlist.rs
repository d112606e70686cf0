//! Upstream host allow-list.

use std::collections::HashSet;

/// Immutable set of lowercase hostnames that may be dialed.
#[derive(Debug, Clone, Default)]
pub struct HostAllowList {
    hosts: HashSet<String>,
}

impl HostAllowList {
    /// Build from configured hostnames. Entries are trimmed and lowercased.
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let hosts = hosts
            .into_iter()
            .map(|h| h.as_ref().trim().to_lowercase())
            .filter(|h| !h.is_empty())
            .collect();
        Self { hosts }
    }

    /// Case-insensitive membership check.
    pub fn contains(&self, host: &str) -> bool {
        self.hosts.contains(&host.to_lowercase())
    }

    /// Iterate hosts (startup pre-warm).
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.hosts.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}
