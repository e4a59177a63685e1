use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, warn};

use crate::api::ApiState;

// A subscriber that can't take a message within this time is dropped
const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// What the live loop needs from a client connection.
#[async_trait]
pub(crate) trait LiveSocket: Send {
    async fn send_text(&mut self, text: String) -> Result<(), axum::Error>;

    /// Resolves with `false` once the client closed or the connection broke.
    async fn next_incoming(&mut self) -> bool;
}

#[async_trait]
impl LiveSocket for WebSocket {
    async fn send_text(&mut self, text: String) -> Result<(), axum::Error> {
        self.send(Message::Text(text.into())).await
    }

    async fn next_incoming(&mut self) -> bool {
        matches!(self.recv().await, Some(Ok(message)) if !matches!(message, Message::Close(_)))
    }
}

pub async fn live(ws: WebSocketUpgrade, State(state): State<Arc<ApiState>>) -> Response {
    ws.on_upgrade(move |socket| stream_snapshots(socket, state, SEND_TIMEOUT))
}

pub(crate) async fn stream_snapshots<S: LiveSocket>(
    mut socket: S,
    state: Arc<ApiState>,
    send_timeout: Duration,
) {
    let mut snapshots = state.feed.subscribe();
    let mut shutdown = state.shutdown.clone();
    debug!("Live subscriber connected");

    if *shutdown.borrow() {
        return;
    }

    loop {
        tokio::select! {
            snapshot = snapshots.recv() => match snapshot {
                Ok(snapshot) => {
                    let message = match serde_json::to_string(snapshot.as_ref()) {
                        Ok(message) => message,
                        Err(err) => {
                            error!("Couldn't serialize snapshot: {}", err);
                            continue;
                        }
                    };

                    match tokio::time::timeout(send_timeout, socket.send_text(message)).await {
                        Ok(Ok(())) => {}
                        Ok(Err(err)) => {
                            debug!("Live subscriber went away: {}", err);
                            break;
                        }
                        Err(_) => {
                            warn!("Live subscriber too slow, disconnecting");
                            break;
                        }
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Live subscriber lagging, {} snapshots dropped", skipped);
                }
                Err(RecvError::Closed) => break,
            },
            open = socket.next_incoming() => {
                if !open {
                    break;
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    debug!("Live subscriber disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::state_with_shutdown;
    use crate::data::tests::temp_storage;
    use crate::feed::Snapshot;
    use crate::model::Value;
    use std::sync::Mutex;
    use tokio::sync::mpsc;
    use tokio::task::JoinHandle;

    const TIMEOUT: Duration = Duration::from_millis(50);

    /// Client side of a live connection, driven by the test.
    struct FakeSocket {
        sent: Arc<Mutex<Vec<String>>>,
        stalled: bool,
        incoming: mpsc::Receiver<bool>,
    }

    #[async_trait]
    impl LiveSocket for FakeSocket {
        async fn send_text(&mut self, text: String) -> Result<(), axum::Error> {
            if self.stalled {
                std::future::pending::<()>().await;
            }
            self.sent.lock().unwrap().push(text);
            Ok(())
        }

        async fn next_incoming(&mut self) -> bool {
            match self.incoming.recv().await {
                Some(open) => open,
                None => std::future::pending().await,
            }
        }
    }

    struct Client {
        sent: Arc<Mutex<Vec<String>>>,
        incoming: mpsc::Sender<bool>,
        handle: JoinHandle<()>,
    }

    async fn connect(state: &Arc<ApiState>, stalled: bool) -> Client {
        let sent = Arc::new(Mutex::new(vec![]));
        let (incoming, incoming_rx) = mpsc::channel(4);
        let socket = FakeSocket {
            sent: sent.clone(),
            stalled,
            incoming: incoming_rx,
        };

        let subscribers = state.feed.subscriber_count();
        let handle = tokio::spawn(stream_snapshots(socket, state.clone(), TIMEOUT));
        while state.feed.subscriber_count() == subscribers {
            tokio::task::yield_now().await;
        }

        Client { sent, incoming, handle }
    }

    fn snapshot(value: f64) -> Snapshot {
        let mut snapshot = Snapshot::new(chrono::Local::now().naive_local());
        snapshot.insert("A".to_string(), Value::Analog(value));
        snapshot
    }

    async fn finished(handle: JoinHandle<()>) -> bool {
        tokio::time::timeout(Duration::from_secs(1), handle).await.is_ok()
    }

    #[tokio::test]
    async fn snapshots_are_sent_as_json_until_shutdown() {
        let (_dir, storage) = temp_storage();
        let (state, shutdown) = state_with_shutdown(storage, vec!["A".to_string()]);
        let state = Arc::new(state);
        let client = connect(&state, false).await;

        state.feed.publish(snapshot(5.2));
        while client.sent.lock().unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let message: serde_json::Value = serde_json::from_str(&client.sent.lock().unwrap()[0]).unwrap();
        assert_eq!(message["values"]["analog"]["A"], 5.2);

        shutdown.send_replace(true);
        assert!(finished(client.handle).await);
        assert_eq!(state.feed.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn slow_client_is_disconnected() {
        let (_dir, storage) = temp_storage();
        let (state, _shutdown) = state_with_shutdown(storage, vec!["A".to_string()]);
        let state = Arc::new(state);
        let client = connect(&state, true).await;

        state.feed.publish(snapshot(1.0));

        assert!(finished(client.handle).await);
        assert!(client.sent.lock().unwrap().is_empty());
        assert_eq!(state.feed.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn client_close_ends_the_stream() {
        let (_dir, storage) = temp_storage();
        let (state, _shutdown) = state_with_shutdown(storage, vec!["A".to_string()]);
        let state = Arc::new(state);
        let client = connect(&state, false).await;

        client.incoming.send(true).await.unwrap();
        client.incoming.send(false).await.unwrap();

        assert!(finished(client.handle).await);
    }

    #[tokio::test]
    async fn already_shut_down_returns_at_once() {
        let (_dir, storage) = temp_storage();
        let (state, shutdown) = state_with_shutdown(storage, vec![]);
        shutdown.send_replace(true);
        let (_incoming, incoming_rx) = mpsc::channel(1);
        let socket = FakeSocket {
            sent: Arc::new(Mutex::new(vec![])),
            stalled: false,
            incoming: incoming_rx,
        };

        let handle = tokio::spawn(stream_snapshots(socket, Arc::new(state), TIMEOUT));

        assert!(finished(handle).await);
    }
}
