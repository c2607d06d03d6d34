//! Loopback HTTP/1.1 server answering every request with its own body.
//!
//! # Design
//! - An axum router on a current-thread tokio runtime, driven from a
//!   background thread so synchronous tests can use it.
//! - Binds `127.0.0.1:0`; every response carries `Connection: close`.
//! - hyper decodes `Content-Length` and chunked bodies and answers
//!   `Expect: 100-continue` once the body is read.
//! - A request without a body is answered with its request target.

use std::net::{SocketAddr, TcpListener as StdListener};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use axum::{
    Router,
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{
        HeaderMap, Method, Uri,
        header::{CONNECTION, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
};
use tokio::net::TcpListener;
use tokio::runtime::{Builder, Runtime};
use tokio::sync::oneshot;
use tracing::{debug, warn};

type Requests = Arc<Mutex<Vec<EchoRequest>>>;

/// One request observed by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoRequest {
    /// Request method.
    pub method: String,
    /// Request target (path and query).
    pub target: String,
    /// Header fields with lowercase names, grouped by name in arrival order.
    pub headers: Vec<(String, String)>,
    /// Decoded request body.
    pub body: Vec<u8>,
}

impl EchoRequest {
    /// First header value named `name`, compared case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Running echo server; stops when dropped.
pub struct EchoServer {
    addr: SocketAddr,
    requests: Requests,
    shutdown: Option<oneshot::Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl EchoServer {
    /// Bind a loopback port and start serving.
    ///
    /// # Errors
    ///
    /// Returns an error when the listener cannot be bound or the runtime
    /// cannot be started.
    pub fn start() -> Result<Self> {
        let listener = StdListener::bind("127.0.0.1:0").context("failed to bind echo server")?;
        listener
            .set_nonblocking(true)
            .context("failed to configure echo listener")?;
        let addr = listener
            .local_addr()
            .context("failed to read echo server address")?;

        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .context("failed to build echo runtime")?;
        let listener = runtime
            .block_on(async { TcpListener::from_std(listener) })
            .context("failed to register echo listener")?;

        let requests: Requests = Arc::new(Mutex::new(Vec::new()));
        let (shutdown, signal) = oneshot::channel();
        let router = router(Arc::clone(&requests));
        let worker = thread::Builder::new()
            .name("easywire-echo".into())
            .spawn(move || serve(&runtime, listener, router, signal))
            .context("failed to spawn echo server thread")?;
        debug!(%addr, "echo server listening");

        Ok(Self {
            addr,
            requests,
            shutdown: Some(shutdown),
            worker: Some(worker),
        })
    }

    /// Bound address.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Absolute URL for `path` on this server.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("http://{}/{}", self.addr, path.trim_start_matches('/'))
    }

    /// Requests served so far.
    #[must_use]
    pub fn requests(&self) -> Vec<EchoRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Drop for EchoServer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn router(requests: Requests) -> Router {
    Router::new()
        .fallback(echo)
        .layer(DefaultBodyLimit::disable())
        .with_state(requests)
}

fn serve(runtime: &Runtime, listener: TcpListener, router: Router, signal: oneshot::Receiver<()>) {
    let served = runtime.block_on(async move {
        axum::serve(listener, router.into_make_service())
            .with_graceful_shutdown(async {
                let _ = signal.await;
            })
            .await
    });
    if let Err(err) = served {
        warn!(error = %err, "echo server stopped unexpectedly");
    }
}

async fn echo(
    State(requests): State<Requests>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let target = uri
        .path_and_query()
        .map_or_else(|| uri.path().to_string(), ToString::to_string);
    let request = EchoRequest {
        method: method.to_string(),
        headers: headers
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect(),
        body: body.to_vec(),
        target,
    };
    let payload = if body.is_empty() {
        Bytes::from(request.target.clone())
    } else {
        body
    };
    debug!(method = %request.method, target = %request.target, body = request.body.len(), "echoed request");
    requests
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(request);

    (
        [
            (CONTENT_TYPE, "application/octet-stream"),
            (CONNECTION, "close"),
        ],
        payload,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpStream;

    fn exchange(server: &EchoServer, request: &[u8]) -> Result<String> {
        let mut stream = TcpStream::connect(server.addr())?;
        stream.write_all(request)?;
        let mut response = String::new();
        stream.read_to_string(&mut response)?;
        Ok(response)
    }

    #[test]
    fn content_length_bodies_are_echoed() -> Result<()> {
        let server = EchoServer::start()?;
        let response = exchange(
            &server,
            b"POST /submit HTTP/1.1\r\nHost: x\r\nContent-Length: 5\r\n\r\nhello",
        )?;
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.ends_with("\r\n\r\nhello"));

        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].header("HOST"), Some("x"));
        Ok(())
    }

    #[test]
    fn chunked_bodies_are_decoded() -> Result<()> {
        let server = EchoServer::start()?;
        let response = exchange(
            &server,
            b"PUT /up HTTP/1.1\r\nHost: x\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nabc\r\n2;ext=1\r\nde\r\n0\r\n\r\n",
        )?;
        assert!(response.ends_with("abcde"));
        assert_eq!(server.requests()[0].body, b"abcde");
        Ok(())
    }

    #[test]
    fn expect_continue_is_answered_before_the_body() -> Result<()> {
        let server = EchoServer::start()?;
        let mut stream = TcpStream::connect(server.addr())?;
        stream.write_all(
            b"POST /slow HTTP/1.1\r\nHost: x\r\nExpect: 100-continue\r\nContent-Length: 3\r\n\r\n",
        )?;
        let mut interim = [0_u8; 25];
        stream.read_exact(&mut interim)?;
        assert_eq!(&interim, b"HTTP/1.1 100 Continue\r\n\r\n");

        stream.write_all(b"abc")?;
        let mut response = String::new();
        stream.read_to_string(&mut response)?;
        assert!(response.ends_with("\r\n\r\nabc"));
        Ok(())
    }

    #[test]
    fn bodiless_requests_echo_the_target() -> Result<()> {
        let server = EchoServer::start()?;
        let response = exchange(&server, b"GET /ping?x=1 HTTP/1.1\r\nHost: x\r\n\r\n")?;
        assert!(response.ends_with("/ping?x=1"));
        assert_eq!(server.url("/ping"), format!("http://{}/ping", server.addr()));
        Ok(())
    }
}
