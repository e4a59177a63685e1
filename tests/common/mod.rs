#![allow(dead_code)]

use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use plc_historian::api::{self, ApiState};
use plc_historian::data::Storage;
use plc_historian::feed::LiveFeed;
use plc_historian::link::LinkState;

pub fn storage() -> (TempDir, Storage) {
    let dir = tempfile::tempdir().unwrap();
    let storage = Storage::open(dir.path().join("historian.db3")).unwrap();
    storage.init().unwrap();
    (dir, storage)
}

/// API served on an ephemeral local port.
pub struct TestApi {
    pub base_url: String,
    pub shutdown: watch::Sender<bool>,
    pub handle: JoinHandle<()>,
    _link_state: watch::Sender<LinkState>,
}

impl TestApi {
    pub async fn start(storage: &Storage, tags: &[&str]) -> TestApi {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());

        let (link_state_tx, link_state) = watch::channel(LinkState::Disconnected);
        let (shutdown, shutdown_rx) = watch::channel(false);

        let state = ApiState {
            tags: tags.iter().map(|tag| tag.to_string()).collect(),
            storage: storage.clone(),
            feed: LiveFeed::new(4),
            link_state,
            shutdown: shutdown_rx,
        };

        TestApi {
            base_url,
            shutdown,
            handle: api::serve(listener, state),
            _link_state: link_state_tx,
        }
    }

    pub async fn get(&self, path: &str, query: &[(&str, &str)]) -> reqwest::Response {
        reqwest::Client::new()
            .get(format!("{}{}", self.base_url, path))
            .query(query)
            .send()
            .await
            .unwrap()
    }

    pub async fn stop(self) {
        self.shutdown.send_replace(true);
        self.handle.await.unwrap();
    }
}
