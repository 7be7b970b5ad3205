//! Path-tree hit counters.
//!
//! Every domain owns a tree of path-segment nodes rooted at `/`. A hit on
//! `/a/b` counts for `/`, `/a` and `/a/b`. A node marked do-not-trace stops
//! recording: neither it nor anything below it is counted.
//!
//! Each node keeps one [`DayCount`] link per day it was hit, newest last.
//! Links are never evicted.

use std::collections::HashMap;
use std::net::IpAddr;

use dashmap::DashMap;
use serde::Serialize;

use crate::statistics::{today, Statistics};

/// Hits on one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DayCount {
    pub day: u64,
    pub count: i64,
}

#[derive(Debug, Default)]
struct Node {
    forever: i64,
    do_not_trace: bool,
    days: Vec<DayCount>,
    last_client: Option<IpAddr>,
    children: HashMap<String, Node>,
}

impl Node {
    fn hit(&mut self, day: u64, client: IpAddr) {
        self.forever += 1;
        self.last_client = Some(client);
        match self.days.last_mut() {
            Some(link) if link.day == day => link.count += 1,
            _ => self.days.push(DayCount { day, count: 1 }),
        }
    }

    fn find(&self, path: &str) -> Option<&Node> {
        segments(path).try_fold(self, |node, segment| node.children.get(segment))
    }

    fn find_or_create(&mut self, path: &str) -> &mut Node {
        segments(path).fold(self, |node, segment| {
            node.children.entry(segment.to_string()).or_default()
        })
    }

    fn day_count(&self, day: u64) -> i64 {
        self.days
            .iter()
            .rev()
            .find(|link| link.day == day)
            .map_or(0, |link| link.count)
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

/// In-memory [`Statistics`] implementation.
#[derive(Debug, Default)]
pub struct HitStatistics {
    domains: DashMap<String, Node>,
}

impl HitStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a hit as of `day`.
    pub fn record_on(&self, domain: &str, path: &str, client: IpAddr, day: u64) {
        let mut root = self.domains.entry(domain.to_string()).or_default();
        let mut node: &mut Node = &mut root;
        if node.do_not_trace {
            return;
        }
        node.hit(day, client);

        for segment in segments(path) {
            node = node.children.entry(segment.to_string()).or_default();
            if node.do_not_trace {
                return;
            }
            node.hit(day, client);
        }
    }

    pub fn day_count(&self, domain: &str, path: &str, day: u64) -> i64 {
        self.domains
            .get(domain)
            .and_then(|root| root.find(path).map(|node| node.day_count(day)))
            .unwrap_or(0)
    }

    pub fn today_count(&self, domain: &str, path: &str) -> i64 {
        self.day_count(domain, path, today())
    }

    /// Per-day links of one node, oldest first.
    pub fn day_chain(&self, domain: &str, path: &str) -> Vec<DayCount> {
        self.domains
            .get(domain)
            .and_then(|root| root.find(path).map(|node| node.days.clone()))
            .unwrap_or_default()
    }

    pub fn last_client(&self, domain: &str, path: &str) -> Option<IpAddr> {
        self.domains
            .get(domain)
            .and_then(|root| root.find(path).and_then(|node| node.last_client))
    }

    pub fn set_do_not_trace(&self, domain: &str, path: &str, do_not_trace: bool) {
        let mut root = self.domains.entry(domain.to_string()).or_default();
        root.find_or_create(path).do_not_trace = do_not_trace;
    }
}

impl Statistics for HitStatistics {
    fn record(&self, domain: &str, path: &str, client: IpAddr) {
        self.record_on(domain, path, client, today());
    }

    fn forever_count(&self, domain: &str, path: &str) -> i64 {
        self.domains
            .get(domain)
            .and_then(|root| root.find(path).map(|node| node.forever))
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> IpAddr {
        "1.2.3.4".parse().unwrap()
    }

    #[test]
    fn repeated_hits_count_forever_and_today() {
        let stats = HitStatistics::new();
        for _ in 0..3 {
            stats.record("shop", "/a/b", client());
        }

        assert_eq!(stats.forever_count("shop", "/a/b"), 3);
        assert_eq!(stats.today_count("shop", "/a/b"), 3);
        assert_eq!(stats.forever_count("shop", "/a"), 3);
        assert_eq!(stats.forever_count("shop", "/"), 3);
        assert_eq!(stats.last_client("shop", "/a/b"), Some(client()));
    }

    #[test]
    fn unknown_paths_count_zero() {
        let stats = HitStatistics::new();
        stats.record("shop", "/a", client());
        assert_eq!(stats.forever_count("shop", "/b"), 0);
        assert_eq!(stats.forever_count("blog", "/a"), 0);
        assert_eq!(stats.today_count("blog", "/"), 0);
    }

    #[test]
    fn day_chain_grows_one_link_per_day() {
        let stats = HitStatistics::new();
        stats.record_on("shop", "/a", client(), 100);
        stats.record_on("shop", "/a", client(), 100);
        stats.record_on("shop", "/a", client(), 101);
        stats.record_on("shop", "/a", client(), 105);

        assert_eq!(
            stats.day_chain("shop", "/a"),
            vec![
                DayCount { day: 100, count: 2 },
                DayCount { day: 101, count: 1 },
                DayCount { day: 105, count: 1 },
            ]
        );
        assert_eq!(stats.day_count("shop", "/a", 100), 2);
        assert_eq!(stats.day_count("shop", "/a", 102), 0);
        assert_eq!(stats.forever_count("shop", "/a"), 4);
    }

    #[test]
    fn do_not_trace_stops_at_the_marked_node() {
        let stats = HitStatistics::new();
        stats.set_do_not_trace("shop", "/private", true);
        stats.record("shop", "/private/report", client());
        stats.record("shop", "/public", client());

        assert_eq!(stats.forever_count("shop", "/"), 2);
        assert_eq!(stats.forever_count("shop", "/private"), 0);
        assert_eq!(stats.forever_count("shop", "/private/report"), 0);
        assert_eq!(stats.forever_count("shop", "/public"), 1);

        stats.set_do_not_trace("shop", "/private", false);
        stats.record("shop", "/private/report", client());
        assert_eq!(stats.forever_count("shop", "/private/report"), 1);
    }
}
