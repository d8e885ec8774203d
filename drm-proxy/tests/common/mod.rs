//! Shared helpers: a stub license server and a proxy on ephemeral ports

#![allow(dead_code)]

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use drm_proxy::{ProxyConfig, ProxyServer, SignedEnvelope};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

/// Stub license server answering every POST with a canned reply
pub struct StubLicenseServer {
    pub url: String,
    received: Arc<Mutex<Vec<SignedEnvelope>>>,
}

impl StubLicenseServer {
    pub async fn start(status: StatusCode, body: &'static str) -> Self {
        let received = Arc::new(Mutex::new(Vec::new()));

        let app = Router::new()
            .route(
                "/cenc/getlicense",
                post(
                    move |State(received): State<Arc<Mutex<Vec<SignedEnvelope>>>>,
                          Json(envelope): Json<SignedEnvelope>| async move {
                        received.lock().unwrap().push(envelope);
                        (status, body)
                    },
                ),
            )
            .with_state(received.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url: format!("http://{}/cenc/getlicense", addr),
            received,
        }
    }

    pub fn received(&self) -> Vec<SignedEnvelope> {
        self.received.lock().unwrap().clone()
    }
}

/// Proxy config pointing at `license_server_url`, unsigned
pub fn proxy_config(license_server_url: &str) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.server.listen_addr = "127.0.0.1:0".to_string();
    config.server.timeout_seconds = 5;
    config.license_server.url = license_server_url.to_string();
    config
}

/// Start the proxy on an ephemeral port and return its base URL
pub async fn start_proxy(config: ProxyConfig) -> String {
    let server = ProxyServer::new(config).expect("valid proxy config");
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let _ = server.serve(listener, std::future::pending()).await;
    });

    format!("http://{}", addr)
}
