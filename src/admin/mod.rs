//! Admin API.
//!
//! # Routes
//! ```text
//! GET    /admin/status                     runtime counters
//! GET    /admin/connections                allocated pool slots
//! GET    /admin/domains                    domain set
//! PUT    /admin/domains/{name}/enabled     {"enabled": bool}
//! GET    /admin/statistics?domain=&path=   hit counters for one path
//! PUT    /admin/statistics/do-not-trace    {"domain", "path", "enabled"}
//! GET    /admin/blacklist                  blacklist entries
//! PUT    /admin/blacklist/{address}        {"action": "block" | "block-and-log" | "allow"}
//! DELETE /admin/blacklist/{address}
//! ```
//!
//! Every route requires `Authorization: Bearer <admin.api_key>`.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, put},
    Router,
};

use tower_http::trace::TraceLayer;

use crate::http::server::Runtime;
use self::auth::admin_auth_middleware;
use self::handlers::*;

/// State shared by admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub runtime: Arc<Runtime>,
    pub api_key: Arc<str>,
}

impl AdminState {
    pub fn new(runtime: Arc<Runtime>, api_key: &str) -> Self {
        Self {
            runtime,
            api_key: Arc::from(api_key),
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/connections", get(get_connections))
        .route("/admin/domains", get(get_domains))
        .route("/admin/domains/{name}/enabled", put(set_domain_enabled))
        .route("/admin/statistics", get(get_statistics))
        .route("/admin/statistics/do-not-trace", put(set_do_not_trace))
        .route("/admin/blacklist", get(get_blacklist))
        .route(
            "/admin/blacklist/{address}",
            put(set_blacklist_entry).delete(remove_blacklist_entry),
        )
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
