//! Wire the configured store, gateway and engine into the HTTP state and
//! the sweeper.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;
use zeroize::Zeroizing;

use crew_lifecycle::{LifecycleEngine, OperatorAuthority};
use crew_payments::{ConfiguredGateway, NullGateway, StripeGateway, WebhookReconciler};
use crew_rpc::{RpcState, ServiceMetrics};
use crew_store::CrewStore;
use crew_types::Clock;

use crate::config::{ConfigError, GatewayKind, ServiceConfig};
use crate::sweeper::Sweeper;

pub struct Service<S> {
    pub engine: Arc<LifecycleEngine<S>>,
    pub gateway: Arc<ConfiguredGateway>,
    pub metrics: Arc<ServiceMetrics>,
    pub state: Arc<RpcState<S, ConfiguredGateway>>,
}

impl<S: CrewStore + 'static> Service<S> {
    pub fn build(
        config: &ServiceConfig,
        store: Arc<S>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let engine = Arc::new(LifecycleEngine::new(store, clock, config.lifecycle.clone()));
        let gateway = Arc::new(build_gateway(config)?);

        let secret = match &config.secrets.webhook_secret {
            Some(secret) => Zeroizing::new(secret.as_bytes().to_vec()),
            None => {
                warn!("no webhook secret configured; using a random one, gateway deliveries will be rejected");
                let random = crew_crypto::random_token_hex(32)
                    .map_err(|e| ConfigError::Invalid(format!("webhook secret: {e}")))?;
                Zeroizing::new(random.into_bytes())
            }
        };
        let reconciler = WebhookReconciler::new(engine.clone(), secret, config.webhook_tolerance_secs);

        let authority = OperatorAuthority::from_digests(&config.operator_token_digests)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if authority.is_empty() {
            warn!("no operator tokens configured; operator endpoints will refuse every caller");
        }

        let metrics = Arc::new(ServiceMetrics::new());
        let state = RpcState::new(
            engine.clone(),
            gateway.clone(),
            reconciler,
            authority,
            config.gateway.urls(),
            Duration::from_secs(config.cache_ttl_secs),
        )
        .with_metrics(metrics.clone());

        Ok(Self {
            engine,
            gateway,
            metrics,
            state: Arc::new(state),
        })
    }

    pub fn sweeper(&self, interval: Duration) -> Sweeper<S, ConfiguredGateway> {
        Sweeper::new(self.state.clone(), interval)
    }
}

fn build_gateway(config: &ServiceConfig) -> Result<ConfiguredGateway, ConfigError> {
    match config.gateway.kind {
        GatewayKind::Stripe => {
            let key = config
                .secrets
                .gateway_api_key
                .clone()
                .ok_or_else(|| ConfigError::Invalid("missing gateway API key".to_string()))?;
            let gateway = StripeGateway::new(config.gateway.api_base.clone(), key)
                .map_err(|e| ConfigError::Invalid(format!("gateway client: {e}")))?;
            Ok(ConfiguredGateway::Stripe(gateway))
        }
        GatewayKind::Null => {
            warn!("using the null payment gateway; no money moves");
            Ok(ConfiguredGateway::Null(NullGateway::new()))
        }
    }
}
