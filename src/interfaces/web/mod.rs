pub(crate) mod auth;
pub(crate) mod error;
mod handlers;
mod router;

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::Stream;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::core::lifecycle::LifecycleComponent;
use crate::core::services::RelayServices;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) services: Arc<RelayServices>,
    pub(crate) log_tx: broadcast::Sender<String>,
}

impl AppState {
    pub(crate) fn new(services: Arc<RelayServices>, log_tx: broadcast::Sender<String>) -> Self {
        Self { services, log_tx }
    }
}

pub struct ApiServer {
    state: AppState,
    shutdown: CancellationToken,
}

impl ApiServer {
    pub fn new(services: Arc<RelayServices>, log_tx: broadcast::Sender<String>) -> Self {
        Self {
            state: AppState::new(services, log_tx),
            shutdown: CancellationToken::new(),
        }
    }
}

// --- SSE Logs (used by router) ---

async fn sse_logs_endpoint(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.log_tx.subscribe();
    let stream = BroadcastStream::new(receiver).map(|msg| match msg {
        Ok(line) => Ok(Event::default().data(line)),
        Err(_) => Ok(Event::default().data("log stream lagged")),
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

// --- Lifecycle Implementations ---

#[async_trait]
impl LifecycleComponent for ApiServer {
    async fn on_init(&mut self) -> Result<()> {
        info!("API server initializing...");
        Ok(())
    }

    async fn on_start(&mut self) -> Result<()> {
        let addr = self.state.services.config.bind_addr();
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind {}", addr))?;
        let app = router::build_api_router(self.state.clone());
        let shutdown = self.shutdown.clone();

        info!("API server running at http://{}", addr);
        tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await;
            if let Err(e) = served {
                tracing::error!("API server crashed: {}", e);
            }
        });
        Ok(())
    }

    async fn on_shutdown(&mut self) -> Result<()> {
        info!("API server shutting down...");
        self.shutdown.cancel();
        Ok(())
    }
}
