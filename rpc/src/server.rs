//! Axum-based HTTP server.

use std::future::Future;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tracing::info;

use crew_payments::PaymentGateway;
use crew_store::CrewStore;

use crate::handlers;
use crate::state::RpcState;

/// Every route, with `state` attached.
pub fn router<S: CrewStore + 'static, G: PaymentGateway>(state: Arc<RpcState<S, G>>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics::<S, G>))
        .route(
            "/queue",
            post(handlers::join_queue::<S, G>)
                .delete(handlers::leave_queue::<S, G>)
                .get(handlers::list_queue::<S, G>),
        )
        .route(
            "/groups",
            post(handlers::create_group::<S, G>).get(handlers::list_groups::<S, G>),
        )
        .route("/groups/:id", get(handlers::group_view::<S, G>))
        .route("/groups/:id/status", post(handlers::advance_status::<S, G>))
        .route("/groups/:id/detail", get(handlers::group_detail::<S, G>))
        .route("/groups/:id/payment", get(handlers::payment_status::<S, G>))
        .route("/groups/:id/rsvp", post(handlers::rsvp::<S, G>))
        .route("/groups/:id/feedback", post(handlers::feedback::<S, G>))
        .route("/me/groups", get(handlers::my_groups::<S, G>))
        .route("/sweep", post(handlers::sweep::<S, G>))
        .route("/checkout", post(handlers::checkout::<S, G>))
        .route("/webhook", post(handlers::webhook::<S, G>))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub struct RpcServer<S, G> {
    pub port: u16,
    pub state: Arc<RpcState<S, G>>,
}

impl<S: CrewStore + 'static, G: PaymentGateway> RpcServer<S, G> {
    pub fn new(port: u16, state: Arc<RpcState<S, G>>) -> Self {
        Self { port, state }
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests.
    pub async fn start(
        &self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> std::io::Result<()> {
        let app = router(self.state.clone());
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!(%addr, gateway = self.state.gateway.name(), "HTTP API listening");
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
    }
}
