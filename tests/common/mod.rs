//! Shared utilities for integration testing.
//!
//! `StubConnector` stands in for the TLS + HTTP/2 connector: it counts
//! dials, records the upstream requests it is asked to send, and answers
//! them with a programmable `Reply`.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::http::header::CONTENT_TYPE;
use axum::http::{Request, Response};
use futures_util::future::BoxFuture;
use futures_util::stream::{self, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::watch;

use stream_proxy::config::StreamProxyConfig;
use stream_proxy::http::HttpServer;
use stream_proxy::lifecycle::Shutdown;
use stream_proxy::upstream::{BodyStream, Connector, PendingResponse, SessionId, UpstreamError, UpstreamSession};

pub const HOST: &str = "livestream.bbnl.in";

/// How the stub upstream answers a request.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Headers, then the given body chunks.
    Respond {
        status: u16,
        content_type: Option<&'static str>,
        content_length: Option<usize>,
        chunks: Vec<&'static [u8]>,
    },
    /// Headers never arrive.
    Hang,
    /// Headers and one chunk, then the body stalls forever.
    Stall(&'static [u8]),
}

impl Reply {
    pub fn ok(content_type: &'static str, body: &'static [u8]) -> Self {
        Reply::Respond {
            status: 200,
            content_type: Some(content_type),
            content_length: Some(body.len()),
            chunks: vec![body],
        }
    }
}

/// Set when the value holding it is dropped.
#[derive(Debug, Clone, Default)]
pub struct DropFlag(Arc<AtomicBool>);

impl DropFlag {
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn guard(&self) -> DropGuard {
        DropGuard(Arc::clone(&self.0))
    }
}

struct DropGuard(Arc<AtomicBool>);

impl Drop for DropGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[derive(Debug)]
pub struct StubConnector {
    reply: Mutex<Reply>,
    refuse: AtomicBool,
    open_failures: Arc<AtomicUsize>,
    opens_stall: Arc<AtomicBool>,
    dials: AtomicUsize,
    dialed_hosts: Mutex<Vec<String>>,
    requests: Arc<Mutex<Vec<Request<()>>>>,
    upstream_dropped: DropFlag,
}

impl StubConnector {
    pub fn new(reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            reply: Mutex::new(reply),
            refuse: AtomicBool::new(false),
            open_failures: Arc::new(AtomicUsize::new(0)),
            opens_stall: Arc::new(AtomicBool::new(false)),
            dials: AtomicUsize::new(0),
            dialed_hosts: Mutex::new(Vec::new()),
            requests: Arc::new(Mutex::new(Vec::new())),
            upstream_dropped: DropFlag::default(),
        })
    }

    /// Every dial fails with connection refused.
    pub fn refusing() -> Arc<Self> {
        let stub = Self::new(Reply::ok("text/plain", b""));
        stub.refuse.store(true, Ordering::SeqCst);
        stub
    }

    /// The next `n` stream opens fail as if the session was torn down.
    pub fn fail_next_opens(&self, n: usize) {
        self.open_failures.store(n, Ordering::SeqCst);
    }

    /// Stream opens never complete, as if every session were saturated.
    pub fn stall_opens(&self) {
        self.opens_stall.store(true, Ordering::SeqCst);
    }

    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    pub fn dialed_hosts(&self) -> Vec<String> {
        self.dialed_hosts.lock().unwrap().clone()
    }

    /// `(uri, headers)` of each upstream request, in order.
    pub fn requests(&self) -> Vec<(String, Vec<(String, String)>)> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| {
                let headers = r
                    .headers()
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_str().unwrap().to_string()))
                    .collect();
                (r.uri().to_string(), headers)
            })
            .collect()
    }

    /// Set once the upstream response future or body has been dropped.
    pub fn upstream_dropped(&self) -> &DropFlag {
        &self.upstream_dropped
    }
}

impl Connector for StubConnector {
    fn connect(&self, host: &str) -> BoxFuture<'static, Result<Arc<dyn UpstreamSession>, UpstreamError>> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        self.dialed_hosts.lock().unwrap().push(host.to_string());
        if self.refuse.load(Ordering::SeqCst) {
            return Box::pin(async { Err(UpstreamError::ConnectionRefused) });
        }

        let (open, _) = watch::channel(true);
        let session: Arc<dyn UpstreamSession> = Arc::new(StubSession {
            id: SessionId::new(),
            host: host.to_string(),
            open,
            reply: self.reply.lock().unwrap().clone(),
            open_failures: Arc::clone(&self.open_failures),
            opens_stall: Arc::clone(&self.opens_stall),
            requests: Arc::clone(&self.requests),
            dropped: self.upstream_dropped.clone(),
        });
        Box::pin(async move { Ok(session) })
    }
}

#[derive(Debug)]
struct StubSession {
    id: SessionId,
    host: String,
    open: watch::Sender<bool>,
    reply: Reply,
    open_failures: Arc<AtomicUsize>,
    opens_stall: Arc<AtomicBool>,
    requests: Arc<Mutex<Vec<Request<()>>>>,
    dropped: DropFlag,
}

impl UpstreamSession for StubSession {
    fn id(&self) -> SessionId {
        self.id
    }

    fn host(&self) -> &str {
        &self.host
    }

    fn is_alive(&self) -> bool {
        *self.open.borrow()
    }

    fn open_stream(&self, request: Request<()>) -> BoxFuture<'static, Result<PendingResponse, UpstreamError>> {
        let failing = self
            .open_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            self.open.send_replace(false);
            return Box::pin(async { Err(UpstreamError::AlreadyClosed) });
        }
        if self.opens_stall.load(Ordering::SeqCst) {
            return Box::pin(std::future::pending());
        }

        self.requests.lock().unwrap().push(request);
        let reply = self.reply.clone();
        let guard = self.dropped.guard();

        Box::pin(async move {
            let pending: PendingResponse = Box::pin(async move {
                match reply {
                    Reply::Respond {
                        status,
                        content_type,
                        content_length,
                        chunks,
                    } => {
                        let mut builder = Response::builder().status(status);
                        if let Some(ct) = content_type {
                            builder = builder.header(CONTENT_TYPE, ct);
                        }
                        if let Some(len) = content_length {
                            builder = builder.header("content-length", len);
                        }
                        let body: BodyStream = stream::iter(chunks)
                            .map(move |chunk| {
                                let _held = &guard;
                                Ok(Bytes::from_static(chunk))
                            })
                            .boxed();
                        Ok(builder.body(body).unwrap())
                    }
                    Reply::Hang => {
                        let _held = guard;
                        std::future::pending().await
                    }
                    Reply::Stall(first) => {
                        let body: BodyStream = stream::iter([Ok(Bytes::from_static(first))])
                            .chain(stream::pending())
                            .map(move |item| {
                                let _held = &guard;
                                item
                            })
                            .boxed();
                        Ok(Response::builder().status(200).body(body).unwrap())
                    }
                }
            });
            Ok(pending)
        })
    }

    fn ping(&self) -> BoxFuture<'static, Result<(), UpstreamError>> {
        Box::pin(async { Ok(()) })
    }

    fn closed(&self) -> BoxFuture<'static, Option<UpstreamError>> {
        let mut rx = self.open.subscribe();
        Box::pin(async move {
            let _ = rx.wait_for(|open| !*open).await;
            None
        })
    }

    fn close(&self) {
        self.open.send_replace(false);
    }
}

/// Start the standalone server on an ephemeral port.
pub async fn start_server(config: StreamProxyConfig, connector: Arc<StubConnector>) -> (SocketAddr, Shutdown) {
    let server = HttpServer::with_connector(config, connector);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let stop = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, stop).await;
    });

    (addr, shutdown)
}
