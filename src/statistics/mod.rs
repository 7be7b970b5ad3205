//! Hit statistics.
//!
//! # Data Flow
//! ```text
//! record-statistics service
//!     → Statistics::record(domain, path, client)
//!     → hits.rs (per-domain path tree, forever + per-day counters)
//!     → admin API reads forever/today counts
//! ```

pub mod hits;

use std::net::IpAddr;
use std::time::{SystemTime, UNIX_EPOCH};

pub use hits::{DayCount, HitStatistics};

/// Hit counters consumed by the chain.
pub trait Statistics: Send + Sync {
    fn record(&self, domain: &str, path: &str, client: IpAddr);
    fn forever_count(&self, domain: &str, path: &str) -> i64;
}

/// Days since the Unix epoch (UTC).
pub fn today() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
        / 86_400
}
