use std::net::IpAddr;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::admin::AdminState;
use crate::config::DomainConfig;
use crate::net::SlotSnapshot;
use crate::security::BlacklistAction;
use crate::statistics::{DayCount, Statistics};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub uptime_secs: u64,
    pub connections_in_use: usize,
    pub connection_capacity: usize,
    pub rejected_connections: u64,
    pub chain_runs: u64,
    pub domains: usize,
    pub sessions: usize,
}

#[derive(Deserialize)]
pub struct EnabledUpdate {
    pub enabled: bool,
}

#[derive(Deserialize)]
pub struct StatisticsQuery {
    pub domain: String,
    #[serde(default = "root_path")]
    pub path: String,
}

fn root_path() -> String {
    "/".to_string()
}

#[derive(Serialize)]
pub struct PathStatistics {
    pub domain: String,
    pub path: String,
    pub forever: i64,
    pub today: i64,
    pub last_client: Option<IpAddr>,
    pub days: Vec<DayCount>,
}

#[derive(Deserialize)]
pub struct DoNotTraceUpdate {
    pub domain: String,
    pub path: String,
    pub enabled: bool,
}

#[derive(Serialize)]
pub struct BlacklistView {
    pub address: String,
    pub action: BlacklistAction,
}

#[derive(Deserialize)]
pub struct BlacklistUpdate {
    pub action: BlacklistAction,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let runtime = &state.runtime;
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: runtime.uptime().as_secs(),
        connections_in_use: runtime.pool.in_use(),
        connection_capacity: runtime.pool.capacity(),
        rejected_connections: runtime.rejected(),
        chain_runs: runtime.engine.runs(),
        domains: runtime.domains.all().len(),
        sessions: runtime.sessions.len(),
    })
}

pub async fn get_connections(State(state): State<AdminState>) -> Json<Vec<SlotSnapshot>> {
    Json(state.runtime.pool.snapshot())
}

pub async fn get_domains(State(state): State<AdminState>) -> Json<Vec<DomainConfig>> {
    Json(state.runtime.domains_file().domains)
}

pub async fn set_domain_enabled(
    State(state): State<AdminState>,
    Path(name): Path<String>,
    Json(update): Json<EnabledUpdate>,
) -> StatusCode {
    if state.runtime.domains.set_enabled(&name, update.enabled) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

pub async fn get_statistics(
    State(state): State<AdminState>,
    Query(query): Query<StatisticsQuery>,
) -> Json<PathStatistics> {
    let stats = &state.runtime.statistics;
    let domain = query.domain.to_ascii_lowercase();
    Json(PathStatistics {
        forever: stats.forever_count(&domain, &query.path),
        today: stats.today_count(&domain, &query.path),
        last_client: stats.last_client(&domain, &query.path),
        days: stats.day_chain(&domain, &query.path),
        domain,
        path: query.path,
    })
}

pub async fn set_do_not_trace(
    State(state): State<AdminState>,
    Json(update): Json<DoNotTraceUpdate>,
) -> StatusCode {
    let domain = update.domain.to_ascii_lowercase();
    if state.runtime.domains.get(&domain).is_none() {
        return StatusCode::NOT_FOUND;
    }
    state
        .runtime
        .statistics
        .set_do_not_trace(&domain, &update.path, update.enabled);
    tracing::info!(domain = %domain, path = %update.path, enabled = update.enabled, "Do-not-trace updated");
    StatusCode::NO_CONTENT
}

pub async fn get_blacklist(State(state): State<AdminState>) -> Json<Vec<BlacklistView>> {
    Json(
        state
            .runtime
            .blacklist
            .entries()
            .into_iter()
            .map(|(address, action)| BlacklistView {
                address: address.to_string(),
                action,
            })
            .collect(),
    )
}

pub async fn set_blacklist_entry(
    State(state): State<AdminState>,
    Path(address): Path<String>,
    Json(update): Json<BlacklistUpdate>,
) -> StatusCode {
    let Ok(address) = address.parse::<IpAddr>() else {
        return StatusCode::BAD_REQUEST;
    };
    state.runtime.blacklist.set(address, update.action);
    tracing::info!(address = %address, action = ?update.action, "Blacklist entry updated");
    StatusCode::NO_CONTENT
}

pub async fn remove_blacklist_entry(
    State(state): State<AdminState>,
    Path(address): Path<String>,
) -> StatusCode {
    let Ok(address) = address.parse::<IpAddr>() else {
        return StatusCode::BAD_REQUEST;
    };
    if state.runtime.blacklist.remove(address) {
        tracing::info!(address = %address, "Blacklist entry removed");
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}
