//! Versioned ciphertext token format.
//!
//! A token looks like:
//!
//! ```text
//! tenantenc:v1:<key_version>:<base64 payload>
//! ```
//!
//! - **Prefix** (`tenantenc:v1`): identifies the per-tenant scheme. Legacy
//!   values are plain base64, whose alphabet has no `:`, so the two can
//!   never be confused.
//! - **Key version**: decimal, strictly positive. It names the tenant key
//!   that produced the payload, and decryption always uses exactly that
//!   version.
//! - **Payload**: standard base64 of `nonce || ciphertext + tag`.
//!
//! This format is persisted in tenant settings and must stay decodable
//! forever.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

/// Scheme prefix, without the trailing separator.
pub const PREFIX: &str = "tenantenc:v1";

/// Separator between token segments.
const SEPARATOR: char = ':';

/// Encode a key version and payload into a token string.
pub fn encode(version: u32, payload: &[u8]) -> String {
    format!("{PREFIX}{SEPARATOR}{version}{SEPARATOR}{}", BASE64.encode(payload))
}

/// Decode a token into `(key_version, payload)`.
///
/// Returns `None` when the string is not a token at all, and also when it
/// carries the prefix but is malformed (non-numeric or zero version, empty
/// or non-base64 payload). Use [`has_prefix`] to tell the two apart.
pub fn decode(token: &str) -> Option<(u32, Vec<u8>)> {
    let rest = token.strip_prefix(PREFIX)?.strip_prefix(SEPARATOR)?;
    let (version_str, payload_str) = rest.split_once(SEPARATOR)?;

    // `u32::from_str` accepts a leading '+', the format does not.
    if version_str.is_empty() || !version_str.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let version: u32 = version_str.parse().ok()?;
    if version == 0 || payload_str.is_empty() {
        return None;
    }

    let payload = BASE64.decode(payload_str).ok()?;
    if payload.is_empty() {
        return None;
    }

    Some((version, payload))
}

/// Returns `true` if `value` claims to be a versioned token.
///
/// A string with the prefix that fails [`decode`] is a broken token, not
/// legacy ciphertext.
pub fn has_prefix(value: &str) -> bool {
    value
        .strip_prefix(PREFIX)
        .is_some_and(|rest| rest.starts_with(SEPARATOR))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_produces_prefixed_token() {
        let token = encode(1, b"payload");
        assert!(token.starts_with("tenantenc:v1:1:"));
        assert_eq!(token, format!("tenantenc:v1:1:{}", BASE64.encode(b"payload")));
    }

    #[test]
    fn decode_returns_version_and_payload() {
        let token = encode(42, &[1, 2, 3, 4]);
        assert_eq!(decode(&token), Some((42, vec![1, 2, 3, 4])));
    }

    #[test]
    fn decode_rejects_foreign_strings() {
        assert_eq!(decode("not-a-token"), None);
        assert_eq!(decode(""), None);
        assert_eq!(decode("tenantenc:v2:1:AAAA"), None);
        assert_eq!(decode("tenantencv1:1:AAAA"), None);
    }

    #[test]
    fn decode_rejects_bad_version_segment() {
        assert_eq!(decode("tenantenc:v1:0:AAAA"), None);
        assert_eq!(decode("tenantenc:v1:-1:AAAA"), None);
        assert_eq!(decode("tenantenc:v1:+1:AAAA"), None);
        assert_eq!(decode("tenantenc:v1:abc:AAAA"), None);
        assert_eq!(decode("tenantenc:v1::AAAA"), None);
        assert_eq!(decode("tenantenc:v1:99999999999:AAAA"), None);
    }

    #[test]
    fn decode_rejects_bad_payload_segment() {
        assert_eq!(decode("tenantenc:v1:1:"), None);
        assert_eq!(decode("tenantenc:v1:1"), None);
        assert_eq!(decode("tenantenc:v1:999:garbage"), None);
        assert_eq!(decode("tenantenc:v1:1:!!!!"), None);
    }

    #[test]
    fn has_prefix_distinguishes_broken_tokens_from_legacy() {
        assert!(has_prefix("tenantenc:v1:999:garbage"));
        assert!(has_prefix("tenantenc:v1:"));
        assert!(!has_prefix("tenantenc:v10:1:AAAA"));
        assert!(!has_prefix("bGVnYWN5"));
        assert!(!has_prefix("not-a-token"));
    }
}
