//! drm-proxy: DRM license request relay
//!
//! Sits between a media player and a Widevine-style license server. Each
//! license challenge posted to the proxy is wrapped in a JSON request,
//! optionally signed on behalf of a registered provider, forwarded to the
//! license server, and the answer is reduced to a simple
//! `{"status", "message", "license"}` JSON body with permissive CORS headers.
//!
//! # Features
//!
//! - Unsigned mode against the public Widevine test server by default
//! - Provider request signing (SHA-1 digest, AES-256-CBC)
//! - HTTP or HTTPS license servers, bounded upstream timeout
//! - Optional static greeting listener, plain or TLS
//!
//! # Example Configuration
//!
//! ```toml
//! [server]
//! listen_addr = "0.0.0.0:8025"
//! timeout_seconds = 30
//!
//! [license_server]
//! url = "https://license.widevine.com/cenc/your_url"
//! key = "HtQS+5CSGFBt0NrjTTaXS9+tTwYWl12l2rsTi/+GQp4="
//! iv = "MD1GNrtCwMd1M/eoSwKb8Q=="
//! provider = "my_provider"
//!
//! [greeting]
//! listen_addr = "0.0.0.0:8585"
//!
//! [greeting.tls]
//! cert_path = "security/greeting-cert.pem"
//! key_path = "security/greeting-key.pem"
//! ```

pub mod config;
pub mod error;
pub mod greeting;
pub mod server;
pub mod signer;
pub mod tls;
pub mod translate;
pub mod upstream;

pub use config::{LicenseServer, ProxyConfig};
pub use error::{ClientError, ConfigError, ProxyError, Result, UpstreamError};
pub use greeting::GreetingServer;
pub use server::ProxyServer;
pub use signer::{sign, SignedEnvelope};
pub use translate::{translate, ProxyResponse, ProxyStatus};
pub use upstream::{UpstreamClient, UpstreamResponse};
