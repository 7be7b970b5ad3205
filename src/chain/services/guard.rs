//! Admission stages: blacklist, protocol version, method, forwarding.

use std::sync::Arc;

use axum::http::{Method, StatusCode};

use crate::chain::context::ChainContext;
use crate::chain::service::{Service, ServiceResult};
use crate::http::request::HttpVersion;
use crate::http::response::Response;
use crate::security::{Blacklist, BlacklistAction};

const ALLOWED_METHODS: &str = "GET, HEAD, POST";

pub struct RejectBlacklisted {
    blacklist: Arc<dyn Blacklist>,
}

impl RejectBlacklisted {
    pub fn new(blacklist: Arc<dyn Blacklist>) -> Self {
        Self { blacklist }
    }
}

impl Service for RejectBlacklisted {
    fn execute(&self, ctx: &mut ChainContext) -> ServiceResult {
        let client = ctx.connection().peer.ip();
        match self.blacklist.action(client) {
            BlacklistAction::Allow => ServiceResult::Next,
            BlacklistAction::Block => ServiceResult::Abort(Response::status_page(StatusCode::FORBIDDEN)),
            BlacklistAction::BlockAndLog => {
                tracing::warn!(
                    client = %client,
                    domain = %ctx.domain().name,
                    target = %ctx.request().target,
                    "Blocked request from blacklisted address"
                );
                ServiceResult::Abort(Response::status_page(StatusCode::FORBIDDEN))
            }
        }
    }
}

pub struct RejectUnsupportedVersion;

impl Service for RejectUnsupportedVersion {
    fn execute(&self, ctx: &mut ChainContext) -> ServiceResult {
        match ctx.request().version {
            HttpVersion::Http10 | HttpVersion::Http11 => ServiceResult::Next,
            HttpVersion::Other(..) => {
                ServiceResult::Abort(Response::status_page(StatusCode::HTTP_VERSION_NOT_SUPPORTED))
            }
        }
    }
}

pub struct RejectUnsupportedMethod;

impl Service for RejectUnsupportedMethod {
    fn execute(&self, ctx: &mut ChainContext) -> ServiceResult {
        let method = &ctx.request().method;
        if *method == Method::GET || *method == Method::HEAD || *method == Method::POST {
            return ServiceResult::Next;
        }

        // Standard methods are understood but not allowed here; anything else is unknown.
        let known = [
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
            Method::PATCH,
            Method::TRACE,
            Method::CONNECT,
        ];
        let status = if known.contains(method) {
            StatusCode::METHOD_NOT_ALLOWED
        } else {
            StatusCode::NOT_IMPLEMENTED
        };
        ServiceResult::Abort(Response::status_page(status).with_header("Allow", ALLOWED_METHODS))
    }
}

pub struct RedirectForward;

impl Service for RedirectForward {
    fn execute(&self, ctx: &mut ChainContext) -> ServiceResult {
        let Some(base) = ctx.domain().forward_url.as_deref() else {
            return ServiceResult::Next;
        };

        let request = ctx.request();
        let mut location = format!("{}{}", base.trim_end_matches('/'), request.path());
        if let Some(query) = request.query() {
            location.push('?');
            location.push_str(query);
        }
        ServiceResult::Abort(Response::status_page(StatusCode::FOUND).with_header("Location", location))
    }
}
