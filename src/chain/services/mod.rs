//! Built-in services.
//!
//! | id | stage |
//! |----|-------|
//! | `reject-blacklisted` | 403 for blocked client addresses |
//! | `reject-unsupported-version` | 505 unless HTTP/1.0 or HTTP/1.1 |
//! | `reject-unsupported-method` | 405 / 501 unless GET, HEAD or POST |
//! | `redirect-forward` | 302 to the domain's forward URL |
//! | `resolve-session` | session from cookie, or a new one |
//! | `require-complete-body` | 400 when the body is shorter than declared |
//! | `decode-form` | query and urlencoded body fields |
//! | `map-resource-path` | request path → file under the document root |
//! | `load-resource` | file contents, 404 when missing |
//! | `record-statistics` | hit counters |
//! | `refresh-session` | extend session expiry |
//! | `transfer-response` | 200 with the loaded resource |

pub mod body;
pub mod guard;
pub mod resource;
pub mod session;
pub mod stats;
pub mod transfer;

use std::sync::Arc;

use crate::chain::service::{ServiceId, ServiceRegistry};
use crate::security::Blacklist;
use crate::session::SessionStore;
use crate::statistics::Statistics;

static BUILTIN_IDS: [ServiceId; 12] = [
    ServiceId::REJECT_BLACKLISTED,
    ServiceId::REJECT_UNSUPPORTED_VERSION,
    ServiceId::REJECT_UNSUPPORTED_METHOD,
    ServiceId::REDIRECT_FORWARD,
    ServiceId::RESOLVE_SESSION,
    ServiceId::REQUIRE_COMPLETE_BODY,
    ServiceId::DECODE_FORM,
    ServiceId::MAP_RESOURCE_PATH,
    ServiceId::LOAD_RESOURCE,
    ServiceId::RECORD_STATISTICS,
    ServiceId::REFRESH_SESSION,
    ServiceId::TRANSFER_RESPONSE,
];

/// Ids of all built-in services, in default chain order.
pub fn builtin_ids() -> &'static [ServiceId] {
    &BUILTIN_IDS
}

/// Chain used by domains that configure none.
pub fn default_chain() -> Vec<ServiceId> {
    BUILTIN_IDS.to_vec()
}

/// Collaborators the built-in services call into.
#[derive(Clone)]
pub struct ServiceDeps {
    pub blacklist: Arc<dyn Blacklist>,
    pub statistics: Arc<dyn Statistics>,
    pub sessions: Arc<dyn SessionStore>,
    pub cookie_name: String,
}

/// Register every built-in service.
pub fn register_builtins(registry: &mut ServiceRegistry, deps: &ServiceDeps) {
    registry
        .register(
            ServiceId::REJECT_BLACKLISTED,
            guard::RejectBlacklisted::new(Arc::clone(&deps.blacklist)),
        )
        .register(ServiceId::REJECT_UNSUPPORTED_VERSION, guard::RejectUnsupportedVersion)
        .register(ServiceId::REJECT_UNSUPPORTED_METHOD, guard::RejectUnsupportedMethod)
        .register(ServiceId::REDIRECT_FORWARD, guard::RedirectForward)
        .register(
            ServiceId::RESOLVE_SESSION,
            session::ResolveSession::new(Arc::clone(&deps.sessions), deps.cookie_name.clone()),
        )
        .register(ServiceId::REQUIRE_COMPLETE_BODY, body::RequireCompleteBody)
        .register(ServiceId::DECODE_FORM, body::DecodeForm)
        .register(ServiceId::MAP_RESOURCE_PATH, resource::MapResourcePath)
        .register(ServiceId::LOAD_RESOURCE, resource::LoadResource)
        .register(
            ServiceId::RECORD_STATISTICS,
            stats::RecordStatistics::new(Arc::clone(&deps.statistics)),
        )
        .register(
            ServiceId::REFRESH_SESSION,
            session::RefreshSession::new(Arc::clone(&deps.sessions)),
        )
        .register(
            ServiceId::TRANSFER_RESPONSE,
            transfer::TransferResponse::new(deps.cookie_name.clone()),
        );
}

/// A registry holding exactly the built-in services.
pub fn builtin_registry(deps: &ServiceDeps) -> ServiceRegistry {
    let mut registry = ServiceRegistry::new();
    register_builtins(&mut registry, deps);
    registry
}

#[cfg(test)]
pub(crate) mod testing {
    use std::net::SocketAddr;
    use std::sync::Arc;

    use axum::http::Method;

    use crate::chain::context::{ChainContext, ConnectionInfo};
    use crate::domain::Domain;
    use crate::http::request::{Header, HttpVersion, Request};
    use crate::net::pool::ConnectionSlotPool;

    pub(crate) fn request(method: Method, target: &str, headers: &[(&str, &str)], body: &[u8]) -> Request {
        Request {
            method,
            target: target.to_string(),
            version: HttpVersion::Http11,
            headers: headers
                .iter()
                .map(|(name, value)| Header {
                    name: name.to_string(),
                    value: value.to_string(),
                })
                .collect(),
            body: body.to_vec(),
        }
    }

    pub(crate) fn context(request: Request, domain: Domain) -> ChainContext {
        let peer: SocketAddr = "192.0.2.10:40000".parse().unwrap();
        let pool = ConnectionSlotPool::new(1);
        let handle = pool.acquire(peer, false).unwrap();
        ChainContext::new(
            request,
            ConnectionInfo { handle, peer, secure: false },
            Arc::new(domain),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::MemoryBlacklist;
    use crate::session::MemorySessionStore;
    use crate::statistics::HitStatistics;

    #[test]
    fn builtins_cover_the_default_chain() {
        let deps = ServiceDeps {
            blacklist: Arc::new(MemoryBlacklist::new()),
            statistics: Arc::new(HitStatistics::new()),
            sessions: Arc::new(MemorySessionStore::new()),
            cookie_name: "VHSESSION".into(),
        };
        let registry = builtin_registry(&deps);
        for id in default_chain() {
            assert!(registry.contains(&id), "{} not registered", id);
        }
        assert_eq!(registry.ids().len(), builtin_ids().len());
    }
}
