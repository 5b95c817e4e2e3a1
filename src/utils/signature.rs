// Webhook signature verification: HMAC-SHA256 over the notification's
// pipe-joined fields, compared in constant time against the
// X-Api-Signature-SHA256 header value.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Lowercase hex digest of `HMAC-SHA256(secret, payload)`.
pub fn sign_payload(secret: &str, payload: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(payload.as_bytes());

    let digest = mac.finalize().into_bytes();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(out, "{:02x}", byte);
    }
    out
}

/// Whether `signature` matches the expected digest for `payload`.
/// Constant-time over the signature bytes.
pub fn verify_signature(secret: &str, payload: &str, signature: &str) -> bool {
    let expected = sign_payload(secret, payload);
    expected.as_bytes().ct_eq(signature.as_bytes()).into()
}
