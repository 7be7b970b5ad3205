//! Service trait, identifiers and results.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::chain::context::ChainContext;
use crate::http::response::Response;

/// Identifier of a service as written in a domain's chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceId(Cow<'static, str>);

impl ServiceId {
    pub const REJECT_BLACKLISTED: ServiceId = ServiceId::from_static("reject-blacklisted");
    pub const REJECT_UNSUPPORTED_VERSION: ServiceId = ServiceId::from_static("reject-unsupported-version");
    pub const REJECT_UNSUPPORTED_METHOD: ServiceId = ServiceId::from_static("reject-unsupported-method");
    pub const REDIRECT_FORWARD: ServiceId = ServiceId::from_static("redirect-forward");
    pub const RESOLVE_SESSION: ServiceId = ServiceId::from_static("resolve-session");
    pub const REQUIRE_COMPLETE_BODY: ServiceId = ServiceId::from_static("require-complete-body");
    pub const DECODE_FORM: ServiceId = ServiceId::from_static("decode-form");
    pub const MAP_RESOURCE_PATH: ServiceId = ServiceId::from_static("map-resource-path");
    pub const LOAD_RESOURCE: ServiceId = ServiceId::from_static("load-resource");
    pub const RECORD_STATISTICS: ServiceId = ServiceId::from_static("record-statistics");
    pub const REFRESH_SESSION: ServiceId = ServiceId::from_static("refresh-session");
    pub const TRANSFER_RESPONSE: ServiceId = ServiceId::from_static("transfer-response");

    pub const fn from_static(id: &'static str) -> Self {
        Self(Cow::Borrowed(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ServiceId {
    fn from(id: &str) -> Self {
        Self(Cow::Owned(id.to_string()))
    }
}

impl From<String> for ServiceId {
    fn from(id: String) -> Self {
        Self(Cow::Owned(id))
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceResult {
    /// Continue with the next service.
    Next,
    /// Stop; this response is final.
    Abort(Response),
    /// Stop; the engine logs the failure and answers with a generic error.
    Error { service: String, detail: String },
}

impl ServiceResult {
    pub fn error(service: &ServiceId, detail: impl Into<String>) -> Self {
        ServiceResult::Error {
            service: service.to_string(),
            detail: detail.into(),
        }
    }
}

/// One stage of a domain's request pipeline.
///
/// Services are synchronous and must not block indefinitely. Every failure is
/// reported as [`ServiceResult::Error`].
pub trait Service: Send + Sync {
    fn execute(&self, ctx: &mut ChainContext) -> ServiceResult;
}

impl<F> Service for F
where
    F: Fn(&mut ChainContext) -> ServiceResult + Send + Sync,
{
    fn execute(&self, ctx: &mut ChainContext) -> ServiceResult {
        self(ctx)
    }
}

/// Services available to domain chains, by id.
#[derive(Clone, Default)]
pub struct ServiceRegistry {
    services: HashMap<ServiceId, Arc<dyn Service>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a service.
    pub fn register(&mut self, id: ServiceId, service: impl Service + 'static) -> &mut Self {
        self.services.insert(id, Arc::new(service));
        self
    }

    pub fn get(&self, id: &ServiceId) -> Option<&Arc<dyn Service>> {
        self.services.get(id)
    }

    pub fn contains(&self, id: &ServiceId) -> bool {
        self.services.contains_key(id)
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<ServiceId> {
        let mut ids: Vec<_> = self.services.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistry").field("ids", &self.ids()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_compare_by_text() {
        assert_eq!(ServiceId::from("decode-form"), ServiceId::DECODE_FORM);
        assert_eq!(ServiceId::LOAD_RESOURCE.to_string(), "load-resource");
    }

    #[test]
    fn ids_deserialize_from_strings() {
        let ids: Vec<ServiceId> = serde_json::from_str(r#"["transfer-response", "custom"]"#).unwrap();
        assert_eq!(ids, vec![ServiceId::TRANSFER_RESPONSE, ServiceId::from("custom")]);
    }

    #[test]
    fn registry_lists_sorted_ids() {
        let mut registry = ServiceRegistry::new();
        registry
            .register(ServiceId::from("b"), |_: &mut ChainContext| ServiceResult::Next)
            .register(ServiceId::from("a"), |_: &mut ChainContext| ServiceResult::Next);
        assert!(registry.contains(&ServiceId::from("a")));
        assert_eq!(registry.ids(), vec![ServiceId::from("a"), ServiceId::from("b")]);
    }
}
