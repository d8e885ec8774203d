//! Client-facing result of a license request

use serde::{Deserialize, Serialize};

use crate::error::UpstreamError;
use crate::upstream::UpstreamResponse;

/// Two-valued status reported to the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProxyStatus {
    Ok,
    Error,
}

/// JSON body returned for every `POST /`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyResponse {
    pub status: ProxyStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
}

impl ProxyResponse {
    pub fn ok(license: Option<String>) -> Self {
        Self {
            status: ProxyStatus::Ok,
            message: String::new(),
            license,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ProxyStatus::Error,
            message: message.into(),
            license: None,
        }
    }
}

/// Map a license server outcome onto the proxy's status vocabulary.
///
/// A non-OK upstream status is surfaced verbatim as the message.
pub fn translate(result: Result<UpstreamResponse, UpstreamError>) -> ProxyResponse {
    match result {
        Ok(resp) if resp.status == "OK" => ProxyResponse::ok(resp.license),
        Ok(resp) => ProxyResponse::error(resp.status),
        Err(e) => ProxyResponse::error(format!("Error in request to license server: {}", e)),
    }
}
