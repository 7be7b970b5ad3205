//! Hit recording stage.

use std::sync::Arc;

use crate::chain::context::ChainContext;
use crate::chain::service::{Service, ServiceResult};
use crate::statistics::Statistics;

pub struct RecordStatistics {
    statistics: Arc<dyn Statistics>,
}

impl RecordStatistics {
    pub fn new(statistics: Arc<dyn Statistics>) -> Self {
        Self { statistics }
    }
}

impl Service for RecordStatistics {
    fn execute(&self, ctx: &mut ChainContext) -> ServiceResult {
        self.statistics.record(
            &ctx.domain().name,
            ctx.request().path(),
            ctx.connection().peer.ip(),
        );
        ServiceResult::Next
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Method;

    use super::*;
    use crate::chain::services::testing::{context, request};
    use crate::domain::tests::test_domain;
    use crate::statistics::HitStatistics;

    #[test]
    fn records_domain_path_and_client() {
        let stats = Arc::new(HitStatistics::new());
        let service = RecordStatistics::new(stats.clone());

        let mut ctx = context(request(Method::GET, "/a/b?x=1", &[], b""), test_domain("shop", "/srv"));
        assert_eq!(service.execute(&mut ctx), ServiceResult::Next);
        service.execute(&mut ctx);

        assert_eq!(stats.forever_count("shop", "/a/b"), 2);
        assert_eq!(stats.last_client("shop", "/a/b"), Some(ctx.connection().peer.ip()));
    }
}
