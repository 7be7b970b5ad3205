//! Per-request scratch state shared by the services of one chain run.
//!
//! Values are stored under typed keys: each key type names a [`KeyTag`] and
//! the one value type stored under it, so a later stage gets back exactly the
//! type an earlier stage inserted.

use std::any::Any;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::domain::Domain;
use crate::http::request::Request;
use crate::net::pool::ConnectionHandle;

/// Tags of the context key registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyTag {
    ResourcePath,
    FormFields,
    Session,
    Resource,
    /// Keys defined outside this crate's built-in services.
    Custom(&'static str),
}

/// A typed context key.
pub trait ContextKey: 'static {
    type Value: Send + 'static;
    const TAG: KeyTag;
}

/// Built-in keys.
pub mod keys {
    use std::path::PathBuf;

    use super::{ContextKey, KeyTag};
    use crate::chain::services::body::FormData;
    use crate::chain::services::resource::LoadedResource;
    use crate::session::SessionBinding;

    /// File system path the request maps to.
    pub struct ResourcePath;

    impl ContextKey for ResourcePath {
        type Value = PathBuf;
        const TAG: KeyTag = KeyTag::ResourcePath;
    }

    /// Decoded query string and form body fields.
    pub struct FormFields;

    impl ContextKey for FormFields {
        type Value = FormData;
        const TAG: KeyTag = KeyTag::FormFields;
    }

    /// Session resolved for this request.
    pub struct Session;

    impl ContextKey for Session {
        type Value = SessionBinding;
        const TAG: KeyTag = KeyTag::Session;
    }

    /// Loaded resource content.
    pub struct Resource;

    impl ContextKey for Resource {
        type Value = LoadedResource;
        const TAG: KeyTag = KeyTag::Resource;
    }
}

/// The connection a request arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub handle: ConnectionHandle,
    pub peer: SocketAddr,
    pub secure: bool,
}

/// Scratch state for exactly one chain execution.
pub struct ChainContext {
    request: Request,
    connection: ConnectionInfo,
    domain: Arc<Domain>,
    values: HashMap<KeyTag, Box<dyn Any + Send>>,
}

impl ChainContext {
    pub fn new(request: Request, connection: ConnectionInfo, domain: Arc<Domain>) -> Self {
        Self {
            request,
            connection,
            domain,
            values: HashMap::new(),
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn connection(&self) -> &ConnectionInfo {
        &self.connection
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    /// Store a value, returning the previous one under the same key.
    pub fn insert<K: ContextKey>(&mut self, value: K::Value) -> Option<K::Value> {
        self.values
            .insert(K::TAG, Box::new(value))
            .and_then(|old| old.downcast::<K::Value>().ok())
            .map(|old| *old)
    }

    pub fn get<K: ContextKey>(&self) -> Option<&K::Value> {
        self.values.get(&K::TAG)?.downcast_ref()
    }

    pub fn get_mut<K: ContextKey>(&mut self) -> Option<&mut K::Value> {
        self.values.get_mut(&K::TAG)?.downcast_mut()
    }

    pub fn remove<K: ContextKey>(&mut self) -> Option<K::Value> {
        self.values
            .remove(&K::TAG)?
            .downcast::<K::Value>()
            .ok()
            .map(|value| *value)
    }

    pub fn contains<K: ContextKey>(&self) -> bool {
        self.values.contains_key(&K::TAG)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::domain::tests::test_domain;
    use crate::http::request::HttpVersion;
    use crate::net::pool::ConnectionSlotPool;

    struct Counter;

    impl ContextKey for Counter {
        type Value = u32;
        const TAG: KeyTag = KeyTag::Custom("counter");
    }

    fn context() -> ChainContext {
        let peer: SocketAddr = "127.0.0.1:5000".parse().unwrap();
        let pool = ConnectionSlotPool::new(1);
        let handle = pool.acquire(peer, false).unwrap();
        let request = Request {
            method: axum::http::Method::GET,
            target: "/".into(),
            version: HttpVersion::Http11,
            headers: Vec::new(),
            body: Vec::new(),
        };
        ChainContext::new(
            request,
            ConnectionInfo { handle, peer, secure: false },
            Arc::new(test_domain("shop", "/srv/shop")),
        )
    }

    #[test]
    fn typed_values_round_trip() {
        let mut ctx = context();
        assert!(ctx.get::<keys::ResourcePath>().is_none());

        ctx.insert::<keys::ResourcePath>(PathBuf::from("/srv/shop/index.html"));
        assert_eq!(
            ctx.get::<keys::ResourcePath>(),
            Some(&PathBuf::from("/srv/shop/index.html"))
        );

        ctx.insert::<Counter>(1);
        *ctx.get_mut::<Counter>().unwrap() += 1;
        assert_eq!(ctx.insert::<Counter>(10), Some(2));
        assert_eq!(ctx.remove::<Counter>(), Some(10));
        assert!(!ctx.contains::<Counter>());
        assert!(ctx.contains::<keys::ResourcePath>());
    }
}
