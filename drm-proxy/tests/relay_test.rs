//! End-to-end tests: client -> proxy -> stub license server

mod common;

use axum::http::StatusCode;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use common::{proxy_config, start_proxy, StubLicenseServer};
use drm_proxy::signer::InnerRequestMessage;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const KEY: &str = "HtQS+5CSGFBt0NrjTTaXS9+tTwYWl12l2rsTi/+GQp4=";
const IV: &str = "MD1GNrtCwMd1M/eoSwKb8Q==";

async fn post_challenge(proxy_url: &str, body: &'static [u8]) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("{}/", proxy_url))
        .body(body)
        .send()
        .await
        .expect("proxy request failed")
}

#[tokio::test]
async fn test_unsigned_license_request() {
    let upstream =
        StubLicenseServer::start(StatusCode::OK, r#"{"status":"OK","license":"bGljZW5zZQ=="}"#)
            .await;
    let proxy_url = start_proxy(proxy_config(&upstream.url)).await;

    let response = post_challenge(&proxy_url, b"challenge-bytes").await;
    assert_eq!(response.status(), 200);

    let headers = response.headers().clone();
    assert_eq!(headers["access-control-allow-origin"], "*");
    assert_eq!(
        headers["access-control-allow-methods"],
        "GET, PUT, POST, DELETE, OPTIONS"
    );
    assert!(headers["access-control-allow-headers"]
        .to_str()
        .unwrap()
        .contains("Content-Type, Authorization, Content-Length"));
    assert_eq!(headers["content-type"], "application/json");

    let body = response.bytes().await.unwrap();
    assert_eq!(headers["content-length"], body.len().to_string().as_str());
    assert_eq!(
        std::str::from_utf8(&body).unwrap(),
        r#"{"status":"OK","message":"","license":"bGljZW5zZQ=="}"#
    );

    let received = upstream.received();
    assert_eq!(received.len(), 1);
    assert!(received[0].signature.is_none());
    assert!(received[0].signer.is_none());

    let message: InnerRequestMessage =
        serde_json::from_slice(&BASE64.decode(&received[0].request).unwrap()).unwrap();
    assert_eq!(BASE64.decode(&message.payload).unwrap(), b"challenge-bytes");
    assert_eq!(message.provider, "widevine_test");
}

#[tokio::test]
async fn test_signed_license_request() {
    let upstream =
        StubLicenseServer::start(StatusCode::OK, r#"{"status":"OK","license":"bGljZW5zZQ=="}"#)
            .await;
    let mut config = proxy_config(&upstream.url);
    config.license_server.key = Some(KEY.to_string());
    config.license_server.iv = Some(IV.to_string());
    config.license_server.provider = "my_provider".to_string();
    let proxy_url = start_proxy(config).await;

    post_challenge(&proxy_url, b"challenge-bytes").await;
    post_challenge(&proxy_url, b"challenge-bytes").await;

    let received = upstream.received();
    assert_eq!(received.len(), 2);
    assert_eq!(received[0].signer.as_deref(), Some("my_provider"));
    assert_eq!(BASE64.decode(received[0].signature.as_ref().unwrap()).unwrap().len(), 32);
    assert_eq!(received[0], received[1]);
}

#[tokio::test]
async fn test_upstream_denial_surfaces_status() {
    let upstream = StubLicenseServer::start(StatusCode::OK, r#"{"status":"SIGNATURE_FAILED"}"#).await;
    let proxy_url = start_proxy(proxy_config(&upstream.url)).await;

    let json: serde_json::Value = serde_json::from_slice(
        &post_challenge(&proxy_url, b"challenge-bytes").await.bytes().await.unwrap(),
    )
    .unwrap();

    assert_eq!(json["status"], "ERROR");
    assert_eq!(json["message"], "SIGNATURE_FAILED");
    assert!(json.get("license").is_none());
}

#[tokio::test]
async fn test_upstream_500_is_error_response() {
    let upstream = StubLicenseServer::start(StatusCode::INTERNAL_SERVER_ERROR, "boom").await;
    let proxy_url = start_proxy(proxy_config(&upstream.url)).await;

    let response = post_challenge(&proxy_url, b"challenge-bytes").await;
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");

    let json: serde_json::Value = serde_json::from_slice(&response.bytes().await.unwrap()).unwrap();
    assert_eq!(json["status"], "ERROR");
    assert!(json["message"].as_str().unwrap().contains("500"));
}

#[tokio::test]
async fn test_upstream_garbage_is_error_response() {
    let upstream = StubLicenseServer::start(StatusCode::OK, "<html>maintenance</html>").await;
    let proxy_url = start_proxy(proxy_config(&upstream.url)).await;

    let json: serde_json::Value = serde_json::from_slice(
        &post_challenge(&proxy_url, b"challenge-bytes").await.bytes().await.unwrap(),
    )
    .unwrap();

    assert_eq!(json["status"], "ERROR");
    assert!(json["message"]
        .as_str()
        .unwrap()
        .contains("Malformed response from license server"));
}

#[tokio::test]
async fn test_truncated_body_closes_without_response() {
    let upstream =
        StubLicenseServer::start(StatusCode::OK, r#"{"status":"OK","license":"bGljZW5zZQ=="}"#)
            .await;
    let proxy_url = start_proxy(proxy_config(&upstream.url)).await;

    let mut stream = TcpStream::connect(proxy_url.trim_start_matches("http://"))
        .await
        .unwrap();
    stream
        .write_all(b"POST / HTTP/1.1\r\nHost: localhost\r\nContent-Length: 100\r\n\r\nchallenge")
        .await
        .unwrap();
    stream.shutdown().await.unwrap();

    // A reset counts as a close; only the bytes read matter.
    let mut reply = Vec::new();
    let _ = tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut reply))
        .await
        .expect("connection was left open");

    assert!(reply.is_empty(), "got {:?}", String::from_utf8_lossy(&reply));
    assert!(upstream.received().is_empty());
}

#[tokio::test]
async fn test_concurrent_requests() {
    let upstream =
        StubLicenseServer::start(StatusCode::OK, r#"{"status":"OK","license":"bGljZW5zZQ=="}"#)
            .await;
    let proxy_url = start_proxy(proxy_config(&upstream.url)).await;

    let requests = (0..8).map(|_| {
        let proxy_url = proxy_url.clone();
        tokio::spawn(async move { post_challenge(&proxy_url, b"challenge-bytes").await.status() })
    });

    for handle in requests.collect::<Vec<_>>() {
        assert_eq!(handle.await.unwrap(), 200);
    }
    assert_eq!(upstream.received().len(), 8);
}

#[test]
fn test_key_without_iv_fails_before_bind() {
    let mut config = proxy_config("http://127.0.0.1:9/license");
    config.license_server.key = Some(KEY.to_string());

    let err = drm_proxy::ProxyServer::new(config).err().expect("config must be rejected");
    assert!(err.to_string().contains("Incomplete signing configuration"));
}
