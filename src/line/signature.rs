//! `X-Line-Signature` verification.
//!
//! LINE signs the raw request body with HMAC-SHA256 keyed by the channel
//! secret and sends the base64 digest. The body must be verified byte for
//! byte before it is parsed.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing X-Line-Signature header")]
    Missing,
    #[error("signature is not valid base64")]
    Encoding,
    #[error("signature mismatch")]
    Mismatch,
}

/// Compute the base64 signature LINE would send for `body`.
#[must_use]
pub fn sign(channel_secret: &str, body: &[u8]) -> String {
    let mut mac = mac_for(channel_secret);
    mac.update(body);
    STANDARD.encode(mac.finalize().into_bytes())
}

/// Verify `signature` against `body`. The digest comparison is constant-time.
///
/// # Errors
///
/// Returns [`SignatureError`] when the header is absent, undecodable, or wrong.
pub fn verify(channel_secret: &str, body: &[u8], signature: Option<&str>) -> Result<(), SignatureError> {
    let signature = signature
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(SignatureError::Missing)?;
    let expected = STANDARD
        .decode(signature)
        .map_err(|_| SignatureError::Encoding)?;

    let mut mac = mac_for(channel_secret);
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| SignatureError::Mismatch)
}

fn mac_for(channel_secret: &str) -> HmacSha256 {
    // HMAC accepts keys of any length, so this cannot fail.
    <HmacSha256 as Mac>::new_from_slice(channel_secret.as_bytes()).unwrap_or_else(|_| unreachable!())
}
