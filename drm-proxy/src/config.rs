//! Configuration for drm-proxy
//!
//! Raw settings are layered from serde defaults, an optional TOML file and
//! `DRM_PROXY__*` environment variables. [`ProxyConfig::validate`] turns them
//! into the immutable [`LicenseServer`] snapshot used for the rest of the
//! process lifetime.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use url::Url;

use crate::error::{ConfigError, Result};
use crate::signer::SigningKey;

/// Environment variable naming the config file when no CLI argument is given
pub const CONFIG_PATH_ENV: &str = "DRM_PROXY_CONFIG";

/// Prefix for per-key environment overrides, e.g. `DRM_PROXY__LICENSE_SERVER__URL`
pub const ENV_PREFIX: &str = "DRM_PROXY";

/// Public Widevine test license server; accepts unsigned requests
pub const DEFAULT_LICENSE_SERVER_URL: &str = "https://license.uat.widevine.com";

/// Provider name of the public Widevine test account
pub const DEFAULT_PROVIDER: &str = "widevine_test";

/// Main proxy configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProxyConfig {
    /// Proxy API listener
    #[serde(default)]
    pub server: ServerConfig,
    /// Upstream license server and signing identity
    #[serde(default)]
    pub license_server: LicenseServerConfig,
    /// Optional static greeting listener
    pub greeting: Option<GreetingConfig>,
}

/// Proxy API listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Listen address (e.g., "0.0.0.0:8025")
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Upstream request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    /// Largest accepted license challenge
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

/// License server configuration as read from the config source
#[derive(Clone, Deserialize)]
pub struct LicenseServerConfig {
    /// License server URL, http or https
    #[serde(default = "default_license_server_url")]
    pub url: String,
    /// 32-byte request signing key, base64
    pub key: Option<String>,
    /// 16-byte signing initialization vector, base64
    pub iv: Option<String>,
    /// Provider name sent in every request and used as signer
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Track types the license may cover
    #[serde(default)]
    pub allowed_track_types: AllowedTrackTypes,
}

/// Greeting listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GreetingConfig {
    /// Listen address (e.g., "0.0.0.0:8585")
    #[serde(default = "default_greeting_addr")]
    pub listen_addr: String,
    /// Serve the greeting over TLS when present
    pub tls: Option<TlsConfig>,
}

/// TLS configuration for the greeting listener
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TlsConfig {
    /// Path to PEM certificate chain
    pub cert_path: Option<String>,
    /// Path to PEM private key
    pub key_path: Option<String>,
    /// Subject names for the self-signed fallback certificate
    #[serde(default)]
    pub domains: Vec<String>,
}

/// Widevine track type policy carried in every license request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AllowedTrackTypes {
    SdOnly,
    #[default]
    SdHd,
    SdUhd1,
    SdUhd2,
}

impl AllowedTrackTypes {
    pub fn as_str(&self) -> &'static str {
        match self {
            AllowedTrackTypes::SdOnly => "SD_ONLY",
            AllowedTrackTypes::SdHd => "SD_HD",
            AllowedTrackTypes::SdUhd1 => "SD_UHD1",
            AllowedTrackTypes::SdUhd2 => "SD_UHD2",
        }
    }
}

/// Outbound transport, fixed by the license server URL scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Http,
    Https,
}

impl Transport {
    fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme {
            "http" => Some(Transport::Http),
            "https" => Some(Transport::Https),
            _ => None,
        }
    }
}

/// Validated, immutable license server settings
#[derive(Debug, Clone)]
pub struct LicenseServer {
    pub url: Url,
    pub transport: Transport,
    pub provider: String,
    pub allowed_track_types: AllowedTrackTypes,
    signing: Option<SigningKey>,
}

impl LicenseServer {
    /// Signing identity, present iff key, IV and provider were all configured
    pub fn signing(&self) -> Option<&SigningKey> {
        self.signing.as_ref()
    }

    pub fn signing_enabled(&self) -> bool {
        self.signing.is_some()
    }
}

impl fmt::Display for LicenseServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "url={} provider={} allowed_track_types={} signed={}",
            self.url,
            self.provider,
            self.allowed_track_types.as_str(),
            self.signing_enabled()
        )
    }
}

// Key material stays out of logs.
impl fmt::Debug for LicenseServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LicenseServerConfig")
            .field("url", &self.url)
            .field("key", &self.key.as_ref().map(|_| "<redacted>"))
            .field("iv", &self.iv.as_ref().map(|_| "<redacted>"))
            .field("provider", &self.provider)
            .field("allowed_track_types", &self.allowed_track_types)
            .finish()
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0:8025".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

fn default_license_server_url() -> String {
    DEFAULT_LICENSE_SERVER_URL.to_string()
}

fn default_provider() -> String {
    DEFAULT_PROVIDER.to_string()
}

fn default_greeting_addr() -> String {
    "0.0.0.0:8585".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            timeout_seconds: default_timeout(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for LicenseServerConfig {
    fn default() -> Self {
        Self {
            url: default_license_server_url(),
            key: None,
            iv: None,
            provider: default_provider(),
            allowed_track_types: AllowedTrackTypes::default(),
        }
    }
}

impl Default for GreetingConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_greeting_addr(),
            tls: None,
        }
    }
}

impl ProxyConfig {
    /// Load configuration from an optional TOML file plus environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).format(config::FileFormat::Toml));
        }
        Self::build(builder)
    }

    /// Parse configuration from TOML text plus environment overrides
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::from_str(content, config::FileFormat::Toml));
        Self::build(builder)
    }

    fn build(builder: config::ConfigBuilder<config::builder::DefaultState>) -> Result<Self> {
        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .map_err(|e| ConfigError::Load(e.to_string()))?;

        let config = settings
            .try_deserialize::<ProxyConfig>()
            .map_err(|e| ConfigError::Load(e.to_string()))?;
        Ok(config)
    }

    /// Validate configuration and produce the license server snapshot
    pub fn validate(&self) -> std::result::Result<LicenseServer, ConfigError> {
        let cfg = &self.license_server;

        let url = Url::parse(&cfg.url).map_err(|e| ConfigError::InvalidUrl {
            url: cfg.url.clone(),
            reason: e.to_string(),
        })?;

        let transport =
            Transport::from_scheme(url.scheme()).ok_or_else(|| ConfigError::UnsupportedScheme {
                url: cfg.url.clone(),
                scheme: url.scheme().to_string(),
            })?;

        let signing = match (&cfg.key, &cfg.iv) {
            (Some(key), Some(iv)) => {
                if cfg.provider.trim().is_empty() {
                    return Err(ConfigError::MissingProvider);
                }
                Some(SigningKey::from_base64(key, iv)?)
            }
            (Some(_), None) => return Err(ConfigError::PartialSigning("key", "iv")),
            (None, Some(_)) => return Err(ConfigError::PartialSigning("iv", "key")),
            (None, None) => None,
        };

        Ok(LicenseServer {
            url,
            transport,
            provider: cfg.provider.clone(),
            allowed_track_types: cfg.allowed_track_types,
            signing,
        })
    }
}
