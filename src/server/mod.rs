//! Sidecar remote API.
//!
//! # Data Flow
//! ```text
//! policy engine (HttpReconfigureClient)
//!     → POST /v1/stop-container → container runtime stop command
//!     → POST /v1/online-update  → MultiHandler::online_update
//! probes
//!     → GET /healthz
//! ```
//!
//! # Design Decisions
//! - Failures are reported in the body (`err_message`), always with 200
//! - Requests are bounded by a timeout layer

pub mod api;
pub mod handlers;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::reload::ConfigHandler;

/// State injected into handlers.
#[derive(Clone)]
pub struct ServerState {
    pub handler: Arc<dyn ConfigHandler>,
    /// Program and leading args; the container id is appended.
    pub stop_command: Arc<Vec<String>>,
}

pub struct SidecarServer {
    router: Router,
}

impl SidecarServer {
    pub fn new(state: ServerState, request_timeout: Duration) -> Self {
        Self {
            router: Self::build_router(state, request_timeout),
        }
    }

    #[allow(deprecated)]
    fn build_router(state: ServerState, request_timeout: Duration) -> Router {
        Router::new()
            .route(api::STOP_CONTAINER_PATH, post(handlers::stop_container))
            .route(api::ONLINE_UPDATE_PATH, post(handlers::online_update))
            .route(api::HEALTH_PATH, get(handlers::healthz))
            .with_state(state)
            .layer(TimeoutLayer::new(request_timeout))
            .layer(TraceLayer::new_for_http())
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> std::io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "sidecar API listening");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("sidecar API stopped");
        Ok(())
    }
}
