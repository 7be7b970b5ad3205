//! Service chain execution.
//!
//! # Control Flow
//! ```text
//! for service in domain.service_chain:
//!     Next              → continue (context changes persist)
//!     Abort(response)   → return response
//!     Error(name, why)  → log, return generic 500
//! exhausted             → log configuration error, return generic 500
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::chain::context::{ChainContext, ConnectionInfo};
use crate::chain::service::{ServiceRegistry, ServiceResult};
use crate::domain::Domain;
use crate::http::request::Request;
use crate::http::response::Response;
use crate::observability::metrics;

/// Runs domain chains against ready requests.
#[derive(Debug)]
pub struct ServiceChainEngine {
    registry: ServiceRegistry,
    runs: AtomicU64,
}

impl ServiceChainEngine {
    pub fn new(registry: ServiceRegistry) -> Self {
        Self {
            registry,
            runs: AtomicU64::new(0),
        }
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    /// Number of chain executions started (one `ChainContext` each).
    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::Relaxed)
    }

    /// Execute `domain`'s chain for `request`.
    pub fn run(&self, domain: Arc<Domain>, request: Request, connection: ConnectionInfo) -> Response {
        self.runs.fetch_add(1, Ordering::Relaxed);
        let mut ctx = ChainContext::new(request, connection, Arc::clone(&domain));

        for id in &domain.service_chain {
            let Some(service) = self.registry.get(id) else {
                tracing::error!(
                    domain = %domain.name,
                    service = %id,
                    detail = "service not registered",
                    "Service failed"
                );
                metrics::record_chain_error(id.as_str());
                return Response::internal_error();
            };

            match service.execute(&mut ctx) {
                ServiceResult::Next => continue,
                ServiceResult::Abort(response) => {
                    tracing::trace!(
                        domain = %domain.name,
                        service = %id,
                        status = response.status.as_u16(),
                        "Chain finished"
                    );
                    return response;
                }
                ServiceResult::Error { service, detail } => {
                    tracing::error!(
                        domain = %domain.name,
                        connection = %connection.handle,
                        service = %service,
                        detail = %detail,
                        "Service failed"
                    );
                    metrics::record_chain_error(&service);
                    return Response::internal_error();
                }
            }
        }

        tracing::error!(
            domain = %domain.name,
            chain_len = domain.service_chain.len(),
            "Configuration error: service chain produced no response"
        );
        Response::internal_error()
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::net::SocketAddr;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    use axum::http::{Method, StatusCode};

    use super::*;
    use crate::chain::context::{ContextKey, KeyTag};
    use crate::chain::service::ServiceId;
    use crate::domain::tests::test_domain;
    use crate::http::request::HttpVersion;
    use crate::net::pool::ConnectionSlotPool;

    struct Note;

    impl ContextKey for Note {
        type Value = String;
        const TAG: KeyTag = KeyTag::Custom("note");
    }

    fn request() -> Request {
        Request {
            method: Method::GET,
            target: "/".into(),
            version: HttpVersion::Http11,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    fn connection() -> ConnectionInfo {
        let peer: SocketAddr = "10.1.1.1:1234".parse().unwrap();
        let pool = ConnectionSlotPool::new(1);
        ConnectionInfo {
            handle: pool.acquire(peer, false).unwrap(),
            peer,
            secure: false,
        }
    }

    fn domain_with_chain(ids: &[&str]) -> Arc<Domain> {
        let mut domain = test_domain("shop", "/srv/shop");
        domain.service_chain = ids.iter().map(|id| ServiceId::from(*id)).collect();
        Arc::new(domain)
    }

    fn counting(counter: &Arc<AtomicUsize>, result: ServiceResult) -> impl Fn(&mut ChainContext) -> ServiceResult {
        let counter = Arc::clone(counter);
        move |_: &mut ChainContext| {
            counter.fetch_add(1, Ordering::SeqCst);
            result.clone()
        }
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn abort_stops_the_chain() {
        let (a, b, c) = (
            Arc::new(AtomicUsize::new(0)),
            Arc::new(AtomicUsize::new(0)),
            Arc::new(AtomicUsize::new(0)),
        );
        let aborted = Response::text(StatusCode::FORBIDDEN, "go away");

        let mut registry = ServiceRegistry::new();
        registry
            .register("a".into(), counting(&a, ServiceResult::Abort(aborted.clone())))
            .register("b".into(), counting(&b, ServiceResult::Next))
            .register("c".into(), counting(&c, ServiceResult::Next));
        let engine = ServiceChainEngine::new(registry);

        let response = engine.run(domain_with_chain(&["a", "b", "c"]), request(), connection());

        assert_eq!(response, aborted);
        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 0);
        assert_eq!(c.load(Ordering::SeqCst), 0);
        assert_eq!(engine.runs(), 1);
    }

    #[test]
    fn error_yields_generic_failure_and_is_logged() {
        let mut registry = ServiceRegistry::new();
        registry
            .register("a".into(), |_: &mut ChainContext| ServiceResult::Next)
            .register("b".into(), |_: &mut ChainContext| ServiceResult::Error {
                service: "B".into(),
                detail: "boom".into(),
            });
        let engine = ServiceChainEngine::new(registry);

        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        let response = tracing::subscriber::with_default(subscriber, || {
            engine.run(domain_with_chain(&["a", "b"]), request(), connection())
        });

        assert_eq!(response, Response::internal_error());
        let logs = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(logs.contains("service=B"), "logs: {}", logs);
        assert!(logs.contains("boom"), "logs: {}", logs);
    }

    #[test]
    fn context_changes_persist_between_services() {
        let mut registry = ServiceRegistry::new();
        registry
            .register("write".into(), |ctx: &mut ChainContext| {
                ctx.insert::<Note>(format!("for {}", ctx.domain().name));
                ServiceResult::Next
            })
            .register("read".into(), |ctx: &mut ChainContext| match ctx.get::<Note>() {
                Some(note) => ServiceResult::Abort(Response::text(StatusCode::OK, note.clone())),
                None => ServiceResult::error(&ServiceId::from("read"), "note missing"),
            });
        let engine = ServiceChainEngine::new(registry);

        let response = engine.run(domain_with_chain(&["write", "read"]), request(), connection());
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body, b"for shop");
    }

    #[test]
    fn exhausted_chain_is_a_configuration_error() {
        let mut registry = ServiceRegistry::new();
        registry.register("a".into(), |_: &mut ChainContext| ServiceResult::Next);
        let engine = ServiceChainEngine::new(registry);

        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        let response = tracing::subscriber::with_default(subscriber, || {
            engine.run(domain_with_chain(&["a"]), request(), connection())
        });

        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        let logs = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(logs.contains("ERROR"), "logs: {}", logs);
        assert!(logs.contains("Configuration error"), "logs: {}", logs);
        assert!(logs.contains("chain_len=1"), "logs: {}", logs);
    }

    #[test]
    fn unregistered_service_fails_the_request() {
        let engine = ServiceChainEngine::new(ServiceRegistry::new());
        let response = engine.run(domain_with_chain(&["missing"]), request(), connection());
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
