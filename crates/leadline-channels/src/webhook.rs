//! Raw webhook payloads and the proof-of-origin primitives adapters build on.

use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;

use crate::error::{ChannelError, Result};

type HmacSha256 = Hmac<Sha256>;

/// One provider callback: the exact bytes received plus their JSON parse.
///
/// Signature schemes hash the raw bytes, parsers read the JSON; both are kept
/// so neither has to re-serialize.
#[derive(Debug, Clone)]
pub struct WebhookPayload {
    raw: Vec<u8>,
    body: Value,
}

impl WebhookPayload {
    pub fn from_bytes(raw: impl Into<Vec<u8>>) -> Result<Self> {
        let raw = raw.into();
        let body = serde_json::from_slice(&raw)?;
        Ok(Self { raw, body })
    }

    pub fn from_json(body: Value) -> Self {
        let raw = body.to_string().into_bytes();
        Self { raw, body }
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn body(&self) -> &Value {
        &self.body
    }
}

/// Compare a presented shared token against the expected one without
/// short-circuiting on the first differing byte.
pub fn tokens_match(expected: &str, presented: &str) -> bool {
    let (a, b) = (expected.as_bytes(), presented.as_bytes());
    if a.is_empty() || a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Verify a GitHub-style `sha256=<hex>` HMAC-SHA256 signature over `body`.
pub fn verify_hmac_sha256(secret: &str, body: &[u8], signature: &str) -> std::result::Result<(), String> {
    let sig_hex = signature
        .trim()
        .strip_prefix("sha256=")
        .ok_or_else(|| "signature is not in sha256=<hex> form".to_string())?;

    let expected = hex::decode(sig_hex).map_err(|_| "signature is not valid hex".to_string())?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| "invalid HMAC key length".to_string())?;
    mac.update(body);

    mac.verify_slice(&expected)
        .map_err(|_| "HMAC signature mismatch".to_string())
}

/// Hex HMAC-SHA256 of `body`, in the `sha256=<hex>` form [`verify_hmac_sha256`] accepts.
pub fn sign_hmac_sha256(secret: &str, body: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| ChannelError::Config("invalid HMAC key length".to_string()))?;
    mac.update(body);
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}
