//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the storage handlers
//! - Wire up middleware (tracing, request ID, metrics) and per-route read timeouts
//! - Bind server to listener and drain on shutdown

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::Request,
    middleware::{self, Next},
    response::Response,
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::blockchain::ChainConnection;
use crate::config::ListenerConfig;
use crate::http::handlers::{get_value, health, set_value};
use crate::http::request::{request_id, UuidRequestId};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::storage::{StorageBinding, ValueInteractor};

/// Application state injected into handlers.
pub struct AppState<C, B> {
    pub interactor: Arc<ValueInteractor<C, B>>,
    /// Longest a write waits for its transaction to be mined before answering.
    pub write_deadline: Duration,
}

impl<C, B> Clone for AppState<C, B> {
    fn clone(&self) -> Self {
        Self {
            interactor: self.interactor.clone(),
            write_deadline: self.write_deadline,
        }
    }
}

/// HTTP façade over a [`ValueInteractor`].
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Create a new HTTP server serving `interactor`.
    pub fn new<C, B>(config: &ListenerConfig, interactor: Arc<ValueInteractor<C, B>>) -> Self
    where
        C: ChainConnection + 'static,
        B: StorageBinding + 'static,
    {
        let state = AppState {
            interactor,
            write_deadline: Duration::from_secs(config.request_timeout_secs),
        };
        let router = Self::build_router(config, state);
        Self { router }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router<C, B>(config: &ListenerConfig, state: AppState<C, B>) -> Router
    where
        C: ChainConnection + 'static,
        B: StorageBinding + 'static,
    {
        let timeout = TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs));

        // POST is left out of the timeout layer: it bounds its own confirmation
        // wait by `write_deadline` and reports the transaction hash on expiry.
        let api = Router::new()
            .route(
                "/storage/value",
                get(get_value::<C, B>)
                    .layer(timeout.clone())
                    .post(set_value::<C, B>),
            )
            .with_state(state);

        Router::new()
            .nest("/api/v1", api)
            .route("/health", get(health).layer(timeout))
            .layer(middleware::from_fn(track_requests))
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                    .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                        tracing::info_span!(
                            "http",
                            method = %request.method(),
                            path = %request.uri().path(),
                            request_id = %request_id(request),
                        )
                    }))
                    .layer(PropagateRequestIdLayer::x_request_id()),
            )
    }

    /// The fully layered router.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve on `listener` until `shutdown` fires, then drain in-flight requests.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move { shutdown.triggered().await })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn track_requests(request: Request<Body>, next: Next) -> Response {
    let method = request.method().to_string();
    let response = next.run(request).await;
    metrics::record_request(&method, response.status().as_u16());
    response
}
