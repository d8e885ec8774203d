//! License request signing
//!
//! Every license challenge is wrapped in an inner request message, serialized
//! once to compact JSON, and base64-encoded into the envelope. When a signing
//! identity is configured, the SHA-1 digest of those exact JSON bytes is
//! encrypted with AES-256-CBC (PKCS#7 padding, encrypted and finalized in a
//! single pass) and attached as the signature.
//!
//! # Example
//! ```
//! use drm_proxy::{signer, ProxyConfig};
//!
//! let server = ProxyConfig::default().validate().unwrap();
//! let envelope = signer::sign(b"challenge-bytes", &server).unwrap();
//! assert!(envelope.signature.is_none());
//! ```

use aes::cipher::{block_padding::Pkcs7, BlockEncryptMut, KeyIvInit};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::fmt;
use tracing::debug;

use crate::config::{AllowedTrackTypes, LicenseServer};
use crate::error::{ConfigError, Result};

/// AES-256 key length in bytes
pub const KEY_LEN: usize = 32;

/// AES block / IV length in bytes
pub const IV_LEN: usize = 16;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;

/// Inner license request; its JSON bytes are what gets signed.
///
/// Field order here is the serialization order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InnerRequestMessage {
    /// Base64 of the raw client challenge
    pub payload: String,
    pub provider: String,
    pub allowed_track_types: AllowedTrackTypes,
}

impl InnerRequestMessage {
    pub fn new(raw: &[u8], server: &LicenseServer) -> Self {
        Self {
            payload: BASE64.encode(raw),
            provider: server.provider.clone(),
            allowed_track_types: server.allowed_track_types,
        }
    }
}

/// Body sent to the license server.
///
/// `signature` and `signer` are omitted from the JSON, not empty, for
/// unsigned requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedEnvelope {
    /// Base64 of the inner request message JSON
    pub request: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signer: Option<String>,
}

impl SignedEnvelope {
    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }
}

/// Provider signing identity
#[derive(Clone)]
pub struct SigningKey {
    key: [u8; KEY_LEN],
    iv: [u8; IV_LEN],
}

impl SigningKey {
    pub fn new(key: [u8; KEY_LEN], iv: [u8; IV_LEN]) -> Self {
        Self { key, iv }
    }

    /// Decode key and IV from base64, enforcing the 32/16 byte lengths
    pub fn from_base64(key: &str, iv: &str) -> std::result::Result<Self, ConfigError> {
        Ok(Self {
            key: decode_fixed("key", key)?,
            iv: decode_fixed("iv", iv)?,
        })
    }

    /// AES-256-CBC encrypt with PKCS#7 padding
    pub fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        Aes256CbcEnc::new(&self.key.into(), &self.iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext)
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningKey(<redacted>)")
    }
}

fn decode_fixed<const N: usize>(
    field: &'static str,
    value: &str,
) -> std::result::Result<[u8; N], ConfigError> {
    let bytes = BASE64
        .decode(value.trim())
        .map_err(|e| ConfigError::InvalidBase64 {
            field,
            reason: e.to_string(),
        })?;

    <[u8; N]>::try_from(bytes.as_slice()).map_err(|_| ConfigError::InvalidLength {
        field,
        expected: N,
        actual: bytes.len(),
    })
}

/// Wrap a raw license challenge into an envelope, signing it when the
/// license server has a signing identity.
pub fn sign(raw: &[u8], server: &LicenseServer) -> Result<SignedEnvelope> {
    let message = InnerRequestMessage::new(raw, server);
    let message_json = serde_json::to_vec(&message)?;
    debug!(
        payload_len = raw.len(),
        "License request message: {}",
        String::from_utf8_lossy(&message_json)
    );

    let (signature, signer) = match server.signing() {
        Some(key) => {
            debug!(signer = %server.provider, "Signing request");
            let digest = Sha1::digest(&message_json);
            let signature = BASE64.encode(key.encrypt(&digest));
            (Some(signature), Some(server.provider.clone()))
        }
        None => (None, None),
    };

    Ok(SignedEnvelope {
        request: BASE64.encode(&message_json),
        signature,
        signer,
    })
}

/// Known-answer checks for the signing primitives, run once before serving
pub fn self_test() -> std::result::Result<(), ConfigError> {
    // SHA-1("abc"), FIPS 180-2 appendix A
    const SHA1_ABC: [u8; 20] = [
        0xa9, 0x99, 0x3e, 0x36, 0x47, 0x06, 0x81, 0x6a, 0xba, 0x3e, 0x25, 0x71, 0x78, 0x50, 0xc2,
        0x6c, 0x9c, 0xd0, 0xd8, 0x9d,
    ];
    if Sha1::digest(b"abc").as_slice() != SHA1_ABC {
        return Err(ConfigError::MissingPrimitive("sha1"));
    }

    // NIST SP 800-38A F.2.5, CBC-AES256.Encrypt block #1
    const KEY: [u8; KEY_LEN] = [
        0x60, 0x3d, 0xeb, 0x10, 0x15, 0xca, 0x71, 0xbe, 0x2b, 0x73, 0xae, 0xf0, 0x85, 0x7d, 0x77,
        0x81, 0x1f, 0x35, 0x2c, 0x07, 0x3b, 0x61, 0x08, 0xd7, 0x2d, 0x98, 0x10, 0xa3, 0x09, 0x14,
        0xdf, 0xf4,
    ];
    const IV: [u8; IV_LEN] = [
        0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e,
        0x0f,
    ];
    const PLAINTEXT: [u8; 16] = [
        0x6b, 0xc1, 0xbe, 0xe2, 0x2e, 0x40, 0x9f, 0x96, 0xe9, 0x3d, 0x7e, 0x11, 0x73, 0x93, 0x17,
        0x2a,
    ];
    const CIPHERTEXT: [u8; 16] = [
        0xf5, 0x8c, 0x4c, 0x04, 0xd6, 0xe5, 0xf1, 0xba, 0x77, 0x9e, 0xab, 0xfb, 0x5f, 0x7b, 0xfb,
        0xd6,
    ];
    let output = SigningKey::new(KEY, IV).encrypt(&PLAINTEXT);
    if output.len() != 2 * IV_LEN || output[..IV_LEN] != CIPHERTEXT {
        return Err(ConfigError::MissingPrimitive("aes-256-cbc"));
    }

    Ok(())
}
