//! HMAC-SHA256 signatures for payment webhooks.
//!
//! The provider sends `x-signature: t=<unix seconds>,v1=<hex digest>` where the
//! digest is `HMAC-SHA256(secret, "<t>.<raw body>")`.

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Why a webhook signature was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("signature header is missing")]
    Missing,

    #[error("signature header is malformed")]
    Malformed,

    #[error("signature timestamp is outside the allowed window")]
    Stale,

    #[error("signature does not match")]
    Mismatch,

    #[error("webhook secret is not usable")]
    InvalidKey,
}

/// Signs and verifies webhook bodies with a shared secret.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: Vec<u8>,
    tolerance: Duration,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("tolerance", &self.tolerance)
            .finish_non_exhaustive()
    }
}

impl WebhookVerifier {
    pub fn new(secret: impl AsRef<[u8]>, tolerance: Duration) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
            tolerance,
        }
    }

    /// Builds the header value a provider would send for `payload` at `timestamp`.
    pub fn sign(&self, payload: &[u8], timestamp: i64) -> Result<String, SignatureError> {
        let mac = self.mac(timestamp, payload)?;
        let digest = hex::encode(mac.finalize().into_bytes());
        Ok(format!("t={timestamp},v1={digest}"))
    }

    /// Checks `header` against `payload`. The digest comparison is constant-time.
    pub fn verify(
        &self,
        payload: &[u8],
        header: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), SignatureError> {
        let header = header.ok_or(SignatureError::Missing)?;
        let (timestamp, digest) = parse_header(header)?;

        let age = now.timestamp().saturating_sub(timestamp);
        if age.unsigned_abs() > self.tolerance.num_seconds().unsigned_abs() {
            return Err(SignatureError::Stale);
        }

        let expected = hex::decode(digest).map_err(|_| SignatureError::Malformed)?;
        self.mac(timestamp, payload)?
            .verify_slice(&expected)
            .map_err(|_| SignatureError::Mismatch)
    }

    /// Returns false when no secret is configured; every signature is then refused.
    pub fn is_configured(&self) -> bool {
        !self.secret.is_empty()
    }

    fn mac(&self, timestamp: i64, payload: &[u8]) -> Result<HmacSha256, SignatureError> {
        // An empty key is a valid HMAC key that anyone can sign with.
        if !self.is_configured() {
            return Err(SignatureError::InvalidKey);
        }
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).map_err(|_| SignatureError::InvalidKey)?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        Ok(mac)
    }
}

fn parse_header(header: &str) -> Result<(i64, &str), SignatureError> {
    let mut timestamp = None;
    let mut digest = None;
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => digest = Some(value),
            _ => {}
        }
    }

    match (timestamp, digest) {
        (Some(timestamp), Some(digest)) if !digest.is_empty() => Ok((timestamp, digest)),
        _ => Err(SignatureError::Malformed),
    }
}
