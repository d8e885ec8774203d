//! License server client
//!
//! One POST per inbound request, no retries. The whole response body is
//! collected before it is parsed.

use serde::{Deserialize, Serialize};
use std::error::Error as _;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::{LicenseServer, Transport};
use crate::error::{ConfigError, UpstreamError};
use crate::signer::SignedEnvelope;

/// License server reply. Only `status` and `license` are interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamResponse {
    pub status: String,
    /// Base64 license, passed through untouched
    #[serde(default)]
    pub license: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// HTTP client bound to the configured license server
pub struct UpstreamClient {
    client: reqwest::Client,
    url: Url,
    timeout: Duration,
}

impl UpstreamClient {
    /// Build the client once at startup
    pub fn new(server: &LicenseServer, timeout: Duration) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .https_only(server.transport == Transport::Https)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ConfigError::Client(e.to_string()))?;

        Ok(Self {
            client,
            url: server.url.clone(),
            timeout,
        })
    }

    /// Send the envelope and classify the outcome
    pub async fn forward(
        &self,
        envelope: &SignedEnvelope,
    ) -> Result<UpstreamResponse, UpstreamError> {
        debug!(
            url = %self.url,
            signed = envelope.is_signed(),
            "Sending request to license server"
        );

        let response = self
            .client
            .post(self.url.clone())
            .json(envelope)
            .send()
            .await
            .map_err(|e| self.network_error(e))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(UpstreamError::BadStatus(status.as_u16()));
        }

        let body = response.bytes().await.map_err(|e| self.network_error(e))?;
        debug!(len = body.len(), "License server response received");

        serde_json::from_slice(&body).map_err(|e| UpstreamError::Malformed(e.to_string()))
    }

    fn network_error(&self, err: reqwest::Error) -> UpstreamError {
        if err.is_timeout() {
            return UpstreamError::Network(format!(
                "timeout after {}s",
                self.timeout.as_secs_f64()
            ));
        }

        let mut detail = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            detail.push_str(": ");
            detail.push_str(&cause.to_string());
            source = cause.source();
        }
        UpstreamError::Network(detail)
    }
}
