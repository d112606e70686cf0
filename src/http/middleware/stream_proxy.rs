//! Stream proxy middleware.
//!
//! Intercepts `/stream/*` (after base-path stripping) and hands every other
//! request to the inner service. The standalone server and an embedding
//! application both mount the proxy through this one middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Request, State},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Router,
};

use crate::config::StreamProxyConfig;
use crate::http::forward::StreamForwarder;
use crate::http::request::request_id;
use crate::routing::is_stream_path;
use crate::security::{GateDecision, Gatekeeper, HostAllowList};
use crate::upstream::{Connector, PoolSettings, SessionPool, TlsH2Connector, UpstreamError};

/// Shared state behind both deployments.
#[derive(Debug, Clone)]
pub struct StreamProxy {
    gatekeeper: Arc<Gatekeeper>,
    forwarder: StreamForwarder,
}

impl StreamProxy {
    /// Build a proxy whose sessions come from `connector`.
    pub fn new(config: &StreamProxyConfig, connector: Arc<dyn Connector>) -> Self {
        let allowlist = HostAllowList::new(config.stream.allowed_hosts.iter());
        let gatekeeper = Gatekeeper::new(allowlist, config.stream.base_path.clone());
        let pool = Arc::new(SessionPool::new(connector, PoolSettings::from(&config.pool)));
        let idle_timeout = Duration::from_secs(config.upstream.idle_timeout_secs);

        Self {
            gatekeeper: Arc::new(gatekeeper),
            forwarder: StreamForwarder::new(pool, idle_timeout),
        }
    }

    /// Build a proxy dialing real upstreams over TLS + HTTP/2.
    pub fn from_config(config: &StreamProxyConfig) -> Result<Self, UpstreamError> {
        let connector = TlsH2Connector::new(&config.upstream)?;
        Ok(Self::new(config, Arc::new(connector)))
    }

    pub fn gatekeeper(&self) -> &Gatekeeper {
        &self.gatekeeper
    }

    pub fn pool(&self) -> &Arc<SessionPool> {
        self.forwarder.pool()
    }

    /// Gate and forward one `/stream/` request.
    pub async fn handle(&self, request: Request) -> Response {
        let request_id = request_id(request.headers());

        let decision = self
            .gatekeeper
            .validate(request.method(), request.uri(), request.headers());

        match decision {
            Ok(GateDecision::Forward { target, cors_origin }) => {
                tracing::debug!(
                    request_id = %request_id,
                    host = %target.host,
                    path = %target.path,
                    "Proxying stream request"
                );
                self.forwarder.forward(&target, cors_origin, &request_id).await
            }
            Ok(GateDecision::Preflight(response)) => response,
            Err(rejection) => {
                tracing::debug!(
                    request_id = %request_id,
                    path = %request.uri().path(),
                    status = %rejection.status(),
                    "Stream request rejected"
                );
                rejection.into_response()
            }
        }
    }

    /// Mount the proxy in front of `router`. Paths outside `/stream/` keep
    /// reaching the router's own routes and fallback.
    pub fn attach<S>(self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router.layer(middleware::from_fn_with_state(self, stream_proxy_middleware))
    }
}

/// `from_fn_with_state` middleware serving `/stream/*`.
pub async fn stream_proxy_middleware(State(proxy): State<StreamProxy>, request: Request, next: Next) -> Response {
    if !is_stream_path(request.uri().path(), proxy.gatekeeper.base_path()) {
        return next.run(request).await;
    }
    proxy.handle(request).await
}
