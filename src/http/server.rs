//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router: stream proxy in front of the fallback
//! - Wire up middleware (tracing, request ID)
//! - Bind server to listener and shut down gracefully

use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::StreamProxyConfig;
use crate::http::middleware::StreamProxy;
use crate::http::request::{StreamRequestId, X_REQUEST_ID};
use crate::http::response::not_found;
use crate::lifecycle::startup;
use crate::upstream::{Connector, UpstreamError};

/// Standalone stream proxy server.
pub struct HttpServer {
    config: StreamProxyConfig,
    proxy: StreamProxy,
    fallback: Router,
}

impl HttpServer {
    /// Create a server that dials real upstreams.
    pub fn new(config: StreamProxyConfig) -> Result<Self, UpstreamError> {
        let proxy = StreamProxy::from_config(&config)?;
        Ok(Self::from_parts(config, proxy))
    }

    /// Create a server with a custom upstream connector.
    pub fn with_connector(config: StreamProxyConfig, connector: Arc<dyn Connector>) -> Self {
        let proxy = StreamProxy::new(&config, connector);
        Self::from_parts(config, proxy)
    }

    fn from_parts(config: StreamProxyConfig, proxy: StreamProxy) -> Self {
        Self {
            config,
            proxy,
            fallback: Router::new().fallback(not_found),
        }
    }

    /// Serve everything outside `/stream/` from `fallback` (static files).
    pub fn with_fallback(mut self, fallback: Router) -> Self {
        self.fallback = fallback;
        self
    }

    /// Build the Axum router with all middleware layers.
    pub fn router(&self) -> Router {
        self.proxy
            .clone()
            .attach(self.fallback.clone())
            .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::new(X_REQUEST_ID, StreamRequestId))
    }

    /// Dial a session for every allow-listed host in the background.
    pub fn prewarm(&self) {
        startup::prewarm_all(self.proxy.pool(), self.proxy.gatekeeper().allowlist());
    }

    /// Run the server until `shutdown` fires, then let in-flight streams finish.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            hosts = self.proxy.gatekeeper().allowlist().len(),
            base_path = %self.config.stream.base_path,
            "HTTP server starting"
        );

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn config(&self) -> &StreamProxyConfig {
        &self.config
    }

    pub fn proxy(&self) -> &StreamProxy {
        &self.proxy
    }
}
