//! A local HTTP server for key fetching tests

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use anyhow::anyhow;
use tiny_http::{Response, Server};

/// Answers every request with the same response until dropped
pub struct KeyServer {
    server: Arc<Server>,
    base: String,
    hits: Arc<AtomicUsize>,
    handle: Option<JoinHandle<()>>,
}

impl KeyServer {
    pub fn serve<S: Into<String>>(status: u16, body: S) -> anyhow::Result<Self> {
        Self::serve_after(Duration::ZERO, status, body)
    }

    /// Accepts every request but waits `delay` before answering it
    pub fn serve_after<S: Into<String>>(
        delay: Duration,
        status: u16,
        body: S,
    ) -> anyhow::Result<Self> {
        let server = Arc::new(Server::http("127.0.0.1:0").map_err(|e| anyhow!(e))?);
        let addr = server
            .server_addr()
            .to_ip()
            .ok_or_else(|| anyhow!("server is not listening on an IP address"))?;

        let hits = Arc::new(AtomicUsize::new(0));
        let body = body.into();

        let handle = {
            let server = server.clone();
            let hits = hits.clone();
            thread::spawn(move || {
                for request in server.incoming_requests() {
                    hits.fetch_add(1, Ordering::SeqCst);
                    thread::sleep(delay);
                    let response = Response::from_string(body.clone()).with_status_code(status);
                    let _ = request.respond(response);
                }
            })
        };

        Ok(Self {
            server,
            base: format!("http://{addr}"),
            hits,
            handle: Some(handle),
        })
    }

    /// The URL of a path on the server
    pub fn url<S: AsRef<str>>(&self, path: S) -> String {
        format!("{}/{}", self.base, path.as_ref().trim_start_matches('/'))
    }

    /// How many requests have been answered so far
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

impl Drop for KeyServer {
    fn drop(&mut self) {
        self.server.unblock();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
