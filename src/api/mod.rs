use anyhow::Result;
use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::data::Storage;
use crate::feed::LiveFeed;
use crate::link::LinkState;

pub mod error;
pub mod history;
mod live;
mod tags;

pub use tags::Status;

pub struct ApiState {
    /// Every configured tag, analog first, in config order.
    pub tags: Vec<String>,
    pub storage: Storage,
    pub feed: LiveFeed,
    pub link_state: watch::Receiver<LinkState>,
    pub shutdown: watch::Receiver<bool>,
}

pub fn router(state: Arc<ApiState>) -> Router {
    let api = Router::new()
        .route("/history", get(history::get_history))
        .route("/tags", get(tags::list_tags))
        .route("/tags/{name}", get(tags::get_tag))
        .route("/tags/{name}/latest", get(tags::get_latest))
        .route("/status", get(tags::get_status));

    Router::new()
        .nest("/api", api)
        .route("/ws", get(live::live))
        .with_state(state)
}

/// Binds the API and serves it in the background until `shutdown` flips.
pub async fn serve_api(state: ApiState, port: u16) -> Result<JoinHandle<()>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("API listening on {}", addr);

    Ok(serve(listener, state))
}

/// Serves the API on an already bound listener.
pub fn serve(listener: TcpListener, state: ApiState) -> JoinHandle<()> {
    let mut shutdown = state.shutdown.clone();
    let api = router(Arc::new(state));

    tokio::spawn(async move {
        let graceful = async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        };

        if let Err(err) = axum::serve(listener, api).with_graceful_shutdown(graceful).await {
            error!("API server stopped: {}", err);
        }
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn state(storage: Storage, tags: Vec<String>) -> Arc<ApiState> {
        Arc::new(state_with_shutdown(storage, tags).0)
    }

    /// Same as `state`, keeping the shutdown switch.
    pub(crate) fn state_with_shutdown(storage: Storage, tags: Vec<String>) -> (ApiState, watch::Sender<bool>) {
        let (_, link_state) = watch::channel(LinkState::Disconnected);
        let (shutdown_tx, shutdown) = watch::channel(false);

        let state = ApiState {
            tags,
            storage,
            feed: LiveFeed::new(4),
            link_state,
            shutdown,
        };
        (state, shutdown_tx)
    }
}
