//! Session stages.

use std::sync::Arc;

use crate::chain::context::{keys, ChainContext};
use crate::chain::service::{Service, ServiceResult};
use crate::session::{SessionBinding, SessionStore};

/// Binds the request to the session named by its cookie, or to a new one.
pub struct ResolveSession {
    sessions: Arc<dyn SessionStore>,
    cookie_name: String,
}

impl ResolveSession {
    pub fn new(sessions: Arc<dyn SessionStore>, cookie_name: String) -> Self {
        Self { sessions, cookie_name }
    }
}

impl Service for ResolveSession {
    fn execute(&self, ctx: &mut ChainContext) -> ServiceResult {
        let domain = ctx.domain();
        let existing = ctx
            .request()
            .cookie(&self.cookie_name)
            .and_then(|id| self.sessions.lookup(&domain.name, id));

        let binding = match existing {
            Some(session) => SessionBinding { session, created: false },
            None => SessionBinding {
                session: self.sessions.new_session(
                    &domain.name,
                    ctx.connection().peer.ip(),
                    domain.session_timeout,
                ),
                created: true,
            },
        };
        ctx.insert::<keys::Session>(binding);
        ServiceResult::Next
    }
}

/// Extends the bound session by the domain's session timeout.
pub struct RefreshSession {
    sessions: Arc<dyn SessionStore>,
}

impl RefreshSession {
    pub fn new(sessions: Arc<dyn SessionStore>) -> Self {
        Self { sessions }
    }
}

impl Service for RefreshSession {
    fn execute(&self, ctx: &mut ChainContext) -> ServiceResult {
        if let Some(binding) = ctx.get::<keys::Session>() {
            if !self.sessions.refresh(&binding.session, ctx.domain().session_timeout) {
                tracing::debug!(session = %binding.session.id, "Session vanished before refresh");
            }
        }
        ServiceResult::Next
    }
}
