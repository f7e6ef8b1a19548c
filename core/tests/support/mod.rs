//! Per-test mock server fixture.
//!
//! Each test starts its own server on an ephemeral port and tears it down on
//! drop, so tests never share state.

use std::thread::JoinHandle;

use mock_server::{AppState, Fixture, RecordedRequest};
use tokio::sync::oneshot;

pub struct MockServer {
    pub base_url: String,
    pub state: AppState,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl MockServer {
    pub fn start(fixture: Fixture) -> Self {
        let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = std_listener.local_addr().unwrap();
        std_listener.set_nonblocking(true).unwrap();

        let state = AppState::new(fixture);
        let server_state = state.clone();
        let (tx, rx) = oneshot::channel::<()>();

        let handle = std::thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            rt.block_on(async {
                let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
                mock_server::run_until(listener, server_state, async {
                    let _ = rx.await;
                })
                .await
            })
            .unwrap();
        });

        Self {
            base_url: format!("http://{addr}/"),
            state,
            shutdown: Some(tx),
            handle: Some(handle),
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests()
    }

    pub fn last_request(&self) -> RecordedRequest {
        self.state.last_request().expect("no request reached the mock server")
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
