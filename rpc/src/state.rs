//! Shared state for the HTTP handlers.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crew_lifecycle::{LifecycleEngine, OperatorAuthority};
use crew_payments::{CheckoutService, CheckoutUrls, PaymentGateway, WebhookReconciler};
use crew_store::CrewStore;
use crew_types::UserId;
use crew_utils::TtlCache;

use crate::handlers::Scope;
use crate::metrics::ServiceMetrics;

/// Keys of the cached list reads.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Queue,
    UserGroups(UserId, Scope),
}

pub struct RpcState<S, G> {
    pub engine: Arc<LifecycleEngine<S>>,
    pub gateway: Arc<G>,
    pub checkout: CheckoutService<S, G>,
    pub reconciler: WebhookReconciler<S>,
    pub authority: OperatorAuthority,
    pub metrics: Arc<ServiceMetrics>,
    /// Fronts list reads only. Cleared after every successful write,
    /// including the daemon's scheduled sweep.
    pub cache: TtlCache<CacheKey, Value>,
}

impl<S: CrewStore, G: PaymentGateway> RpcState<S, G> {
    pub fn new(
        engine: Arc<LifecycleEngine<S>>,
        gateway: Arc<G>,
        reconciler: WebhookReconciler<S>,
        authority: OperatorAuthority,
        urls: CheckoutUrls,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            checkout: CheckoutService::new(engine.clone(), gateway.clone(), urls),
            engine,
            gateway,
            reconciler,
            authority,
            metrics: Arc::new(ServiceMetrics::new()),
            cache: TtlCache::new(cache_ttl),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<ServiceMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Drop every cached list read. Call after any committed write.
    pub fn invalidate_lists(&self) {
        self.cache.clear();
    }
}
