//! End-to-end tests for the stream proxy.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use tower::ServiceExt;

use stream_proxy::config::StreamProxyConfig;
use stream_proxy::http::{HttpServer, StreamProxy};

mod common;
use common::{Reply, StubConnector, HOST};

const PLAYLIST: &[u8] = b"#EXTM3U\n#EXT-X-VERSION:3\n#EXTINF:6.0,\nseg1.ts\n";

fn app(connector: &Arc<StubConnector>) -> Router {
    HttpServer::with_connector(StreamProxyConfig::default(), connector.clone()).router()
}

async fn send(app: Router, request: Request<Body>) -> Response {
    app.oneshot(request).await.unwrap()
}

async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn get_req(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_playlist_is_proxied_end_to_end() {
    let connector = StubConnector::new(Reply::ok("application/vnd.apple.mpegurl", PLAYLIST));
    let (addr, shutdown) = common::start_server(StreamProxyConfig::default(), connector.clone()).await;

    let url = format!("http://{addr}/stream/{HOST}/hls/ch1.m3u8");
    let response = reqwest::get(&url).await.unwrap();

    assert_eq!(response.status(), 200);
    let headers = response.headers().clone();
    assert_eq!(headers["content-type"], "application/vnd.apple.mpegurl");
    assert_eq!(headers["cache-control"], "no-store");
    assert_eq!(headers["access-control-allow-origin"], format!("http://{addr}").as_str());
    assert_eq!(headers["access-control-allow-methods"], "GET, OPTIONS");
    assert!(headers.contains_key("x-request-id"));
    assert_eq!(response.bytes().await.unwrap().as_ref(), PLAYLIST);

    assert_eq!(connector.dialed_hosts(), vec![HOST.to_string()]);
    shutdown.trigger();
}

#[tokio::test]
async fn test_unknown_host_is_rejected_without_dial() {
    let connector = StubConnector::new(Reply::ok("video/mp2t", b"ts"));

    let response = send(app(&connector), get_req("/stream/unknown.example/x.ts")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_text(response).await, "Invalid stream host");

    let response = send(app(&connector), get_req(&format!("/stream/{HOST}"))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert_eq!(connector.dials(), 0);
}

#[tokio::test]
async fn test_preflight_is_answered_locally() {
    let connector = StubConnector::new(Reply::ok("video/mp2t", b"ts"));
    let request = Request::options(format!("/stream/{HOST}/hls/ch1.m3u8"))
        .header("host", "app.local")
        .header("origin", "http://app.local")
        .body(Body::empty())
        .unwrap();

    let response = send(app(&connector), request).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let headers = response.headers().clone();
    assert_eq!(headers["access-control-allow-origin"], "http://app.local");
    assert_eq!(headers["access-control-allow-methods"], "GET, OPTIONS");
    assert_eq!(headers["access-control-allow-headers"], "Range, Content-Type");
    assert_eq!(headers["access-control-max-age"], "86400");
    assert!(body_text(response).await.is_empty());
    assert_eq!(connector.dials(), 0);
}

#[tokio::test]
async fn test_refused_dial_answers_502() {
    let connector = StubConnector::refusing();

    let response = send(app(&connector), get_req(&format!("/stream/{HOST}/hls/ch1.m3u8"))).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_text(response).await, "Stream proxy error");
    assert_eq!(connector.dials(), 1);
}

#[tokio::test]
async fn test_origin_gate() {
    let connector = StubConnector::new(Reply::ok("video/mp2t", b"ts"));
    let uri = format!("/stream/{HOST}/seg1.ts");

    let cross = Request::get(&uri)
        .header("host", "app.local")
        .header("origin", "https://evil.example")
        .body(Body::empty())
        .unwrap();
    let response = send(app(&connector), cross).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_text(response).await, "Forbidden");
    assert_eq!(connector.dials(), 0);

    let same = Request::get(&uri)
        .header("host", "app.local")
        .header("origin", "https://app.local")
        .body(Body::empty())
        .unwrap();
    let response = send(app(&connector), same).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["access-control-allow-origin"], "https://app.local");

    let referred = Request::get(&uri)
        .header("host", "app.local")
        .header("referer", "http://app.local/player.html")
        .body(Body::empty())
        .unwrap();
    let response = send(app(&connector), referred).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["access-control-allow-origin"], "http://app.local");
}

#[tokio::test]
async fn test_upstream_request_carries_no_client_headers() {
    let connector = StubConnector::new(Reply::ok("video/mp2t", b"ts"));
    let request = Request::get("/stream/LiveStream.BBNL.in/hls/seg1.ts?token=abc")
        .header("cookie", "session=secret")
        .header("authorization", "Bearer secret")
        .body(Body::empty())
        .unwrap();

    let response = send(app(&connector), request).await;
    assert_eq!(response.status(), StatusCode::OK);

    let requests = connector.requests();
    assert_eq!(requests.len(), 1);
    let (uri, headers) = &requests[0];
    assert_eq!(uri, &format!("https://{HOST}/hls/seg1.ts?token=abc"));
    assert_eq!(headers, &vec![("accept".to_string(), "*/*".to_string())]);
}

#[tokio::test]
async fn test_response_headers_are_narrowed() {
    let connector = StubConnector::new(Reply::Respond {
        status: 404,
        content_type: None,
        content_length: None,
        chunks: vec![b"missing"],
    });

    let response = send(app(&connector), get_req(&format!("/stream/{HOST}/gone.ts"))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.headers()["content-type"], "application/octet-stream");
    assert_eq!(response.headers()["cache-control"], "no-store");
    assert!(response.headers().get("content-length").is_none());
    assert_eq!(body_text(response).await, "missing");
}

#[tokio::test]
async fn test_session_is_reused_across_requests() {
    let connector = StubConnector::new(Reply::ok("video/mp2t", b"ts"));
    let app = app(&connector);

    for _ in 0..3 {
        let response = send(app.clone(), get_req(&format!("/stream/{HOST}/seg.ts"))).await;
        assert_eq!(body_text(response).await, "ts");
    }
    assert_eq!(connector.dials(), 1);
}

#[tokio::test]
async fn test_failed_open_is_retried_once() {
    let connector = StubConnector::new(Reply::ok("video/mp2t", b"ts"));
    connector.fail_next_opens(1);

    let response = send(app(&connector), get_req(&format!("/stream/{HOST}/seg.ts"))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "ts");
    assert_eq!(connector.dials(), 2);
}

#[tokio::test]
async fn test_second_failed_open_answers_502() {
    let connector = StubConnector::new(Reply::ok("video/mp2t", b"ts"));
    connector.fail_next_opens(2);
    let server = HttpServer::with_connector(StreamProxyConfig::default(), connector.clone());
    let pool = server.proxy().pool().clone();

    let response = send(server.router(), get_req(&format!("/stream/{HOST}/seg.ts"))).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(connector.dials(), 2);
    assert_eq!(pool.stats(HOST).await.unwrap().active, 0);
}

#[tokio::test]
async fn test_client_abort_before_headers_cancels_upstream() {
    let connector = StubConnector::new(Reply::Hang);
    let server = HttpServer::with_connector(StreamProxyConfig::default(), connector.clone());
    let pool = server.proxy().pool().clone();

    let request = server.router().oneshot(get_req(&format!("/stream/{HOST}/seg.ts")));
    assert!(tokio::time::timeout(Duration::from_millis(100), request).await.is_err());

    assert!(connector.upstream_dropped().is_set());
    assert_eq!(pool.stats(HOST).await.unwrap().active, 0);
}

#[tokio::test]
async fn test_client_abort_mid_body_cancels_upstream() {
    let connector = StubConnector::new(Reply::Stall(b"first"));
    let server = HttpServer::with_connector(StreamProxyConfig::default(), connector.clone());
    let pool = server.proxy().pool().clone();

    let response = send(server.router(), get_req(&format!("/stream/{HOST}/live.ts"))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(pool.stats(HOST).await.unwrap().active, 1);
    assert!(!connector.upstream_dropped().is_set());

    drop(response);
    assert!(connector.upstream_dropped().is_set());
    assert_eq!(pool.stats(HOST).await.unwrap().active, 0);
}

#[tokio::test(start_paused = true)]
async fn test_header_timeout_answers_502() {
    let connector = StubConnector::new(Reply::Hang);

    let response = send(app(&connector), get_req(&format!("/stream/{HOST}/seg.ts"))).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_text(response).await, "Stream proxy error");
    assert!(connector.upstream_dropped().is_set());
}

#[tokio::test(start_paused = true)]
async fn test_stream_open_that_never_completes_answers_502() {
    let connector = StubConnector::new(Reply::ok("video/mp2t", b"ts"));
    connector.stall_opens();
    let server = HttpServer::with_connector(StreamProxyConfig::default(), connector.clone());
    let pool = server.proxy().pool().clone();

    let response = send(server.router(), get_req(&format!("/stream/{HOST}/seg.ts"))).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_text(response).await, "Stream proxy error");
    assert_eq!(connector.dials(), 2);
    assert!(connector.requests().is_empty());
    assert_eq!(pool.stats(HOST).await.unwrap().active, 0);
}

#[tokio::test]
async fn test_non_stream_paths_reach_fallback() {
    let connector = StubConnector::new(Reply::ok("video/mp2t", b"ts"));

    let response = send(app(&connector), get_req("/index.html")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let server = HttpServer::with_connector(StreamProxyConfig::default(), connector.clone())
        .with_fallback(Router::new().fallback(|| async { "static" }));
    let response = send(server.router(), get_req("/index.html")).await;
    assert_eq!(body_text(response).await, "static");
    assert_eq!(connector.dials(), 0);
}

#[tokio::test]
async fn test_attached_to_existing_router_with_base_path() {
    let connector = StubConnector::new(Reply::ok("video/mp2t", b"segment"));
    let mut config = StreamProxyConfig::default();
    config.stream.base_path = "/app".to_string();

    let proxy = StreamProxy::new(&config, connector.clone());
    let dev = proxy.attach(Router::new().route("/app/index.html", get(|| async { "index" })));

    let response = send(dev.clone(), get_req(&format!("/app/stream/{HOST}/seg1.ts"))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "segment");

    let response = send(dev.clone(), get_req(&format!("/stream/{HOST}/seg1.ts"))).await;
    assert_eq!(body_text(response).await, "segment");

    let response = send(dev.clone(), get_req("/app/index.html")).await;
    assert_eq!(body_text(response).await, "index");

    let response = send(dev, get_req("/app/stream/unknown.example/seg1.ts")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(connector.dials(), 1);
}
