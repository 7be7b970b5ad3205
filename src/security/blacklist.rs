//! Client address blacklist.

use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::config::BlacklistEntry;

/// What to do with a request from a listed address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlacklistAction {
    #[default]
    Allow,
    Block,
    BlockAndLog,
}

/// Address policy lookup consumed by the chain.
pub trait Blacklist: Send + Sync {
    fn action(&self, address: IpAddr) -> BlacklistAction;
}

/// In-memory blacklist keyed by IP address.
#[derive(Debug, Default)]
pub struct MemoryBlacklist {
    entries: DashMap<IpAddr, BlacklistAction>,
}

impl MemoryBlacklist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from config entries, skipping unparsable addresses.
    pub fn from_entries(entries: &[BlacklistEntry]) -> Self {
        let blacklist = Self::new();
        blacklist.replace_all(entries);
        blacklist
    }

    pub fn set(&self, address: IpAddr, action: BlacklistAction) {
        if action == BlacklistAction::Allow {
            self.entries.remove(&address);
        } else {
            self.entries.insert(address, action);
        }
    }

    pub fn remove(&self, address: IpAddr) -> bool {
        self.entries.remove(&address).is_some()
    }

    /// Listed addresses, sorted.
    pub fn entries(&self) -> BTreeMap<IpAddr, BlacklistAction> {
        self.entries.iter().map(|e| (*e.key(), *e.value())).collect()
    }

    /// Swap in a new entry set. Addresses listed in both sets stay listed throughout.
    pub fn replace_all(&self, entries: &[BlacklistEntry]) {
        let mut next = HashMap::with_capacity(entries.len());
        for entry in entries {
            match entry.address.parse::<IpAddr>() {
                Ok(address) => {
                    next.insert(address, entry.action);
                }
                Err(e) => {
                    tracing::warn!(address = %entry.address, error = %e, "Ignoring invalid blacklist entry")
                }
            }
        }

        for (&address, &action) in &next {
            self.set(address, action);
        }
        self.entries
            .retain(|address, _| next.get(address).is_some_and(|a| *a != BlacklistAction::Allow));
    }
}

impl Blacklist for MemoryBlacklist {
    fn action(&self, address: IpAddr) -> BlacklistAction {
        self.entries.get(&address).map(|e| *e.value()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn unknown_addresses_are_allowed() {
        let blacklist = MemoryBlacklist::new();
        assert_eq!(blacklist.action(ip("10.0.0.1")), BlacklistAction::Allow);
    }

    #[test]
    fn set_and_remove() {
        let blacklist = MemoryBlacklist::new();
        blacklist.set(ip("10.0.0.1"), BlacklistAction::BlockAndLog);
        assert_eq!(blacklist.action(ip("10.0.0.1")), BlacklistAction::BlockAndLog);

        blacklist.set(ip("10.0.0.1"), BlacklistAction::Allow);
        assert!(blacklist.entries().is_empty());

        blacklist.set(ip("::1"), BlacklistAction::Block);
        assert!(blacklist.remove(ip("::1")));
        assert!(!blacklist.remove(ip("::1")));
    }

    #[test]
    fn config_entries_skip_invalid_addresses() {
        let blacklist = MemoryBlacklist::from_entries(&[
            BlacklistEntry {
                address: "192.168.1.9".into(),
                action: BlacklistAction::Block,
            },
            BlacklistEntry {
                address: "not-an-ip".into(),
                action: BlacklistAction::Block,
            },
        ]);
        assert_eq!(blacklist.entries().len(), 1);
        assert_eq!(blacklist.action(ip("192.168.1.9")), BlacklistAction::Block);
    }

    #[test]
    fn replacing_keeps_shared_entries_listed() {
        let entry = |address: &str, action| BlacklistEntry {
            address: address.into(),
            action,
        };
        let blacklist = MemoryBlacklist::from_entries(&[
            entry("10.0.0.1", BlacklistAction::Block),
            entry("10.0.0.2", BlacklistAction::Block),
        ]);
        let next = [
            entry("10.0.0.1", BlacklistAction::Block),
            entry("10.0.0.3", BlacklistAction::BlockAndLog),
        ];

        std::thread::scope(|scope| {
            let reader = scope.spawn(|| {
                for _ in 0..10_000 {
                    assert_eq!(blacklist.action(ip("10.0.0.1")), BlacklistAction::Block);
                }
            });
            for _ in 0..200 {
                blacklist.replace_all(&next);
            }
            reader.join().unwrap();
        });

        let entries = blacklist.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries.get(&ip("10.0.0.3")), Some(&BlacklistAction::BlockAndLog));
        assert!(!entries.contains_key(&ip("10.0.0.2")));
    }

    #[test]
    fn actions_use_kebab_case() {
        let action: BlacklistAction = serde_json::from_str("\"block-and-log\"").unwrap();
        assert_eq!(action, BlacklistAction::BlockAndLog);
    }
}
