//! Unverified access token claims.
//!
//! The signature is never checked. Claims decoded here only decide when to
//! refresh and must not be used to authorize anything.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use serde::Deserialize;
use std::time::Duration;

/// Standard alphabet, padding optional, trailing bits tolerated.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

#[derive(Deserialize)]
struct RawClaims {
    exp: Option<f64>,
    iat: Option<f64>,
}

/// Expiry and issue time, in epoch seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedClaims {
    pub expires_at: i64,
    pub issued_at: i64,
}

impl DecodedClaims {
    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at.saturating_mul(1000)
    }

    /// True when the token expires within `lead` of `now_ms`, or already has.
    pub fn expires_within(&self, lead: Duration, now_ms: i64) -> bool {
        let lead_ms = i64::try_from(lead.as_millis()).unwrap_or(i64::MAX);
        now_ms.saturating_add(lead_ms) >= self.expires_at.saturating_mul(1000)
    }
}

/// Decode the payload segment of a three-segment token.
///
/// Returns `None` on any failure instead of an error.
pub fn decode_claims(token: &str) -> Option<DecodedClaims> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return None;
    }

    let payload: String = segments[1]
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            c => c,
        })
        .collect();

    let bytes = LENIENT.decode(payload).ok()?;
    let json = String::from_utf8(bytes).ok()?;
    let raw: RawClaims = serde_json::from_str(&json).ok()?;

    Some(DecodedClaims {
        expires_at: raw.exp? as i64,
        issued_at: raw.iat? as i64,
    })
}

/// Wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
    use serde_json::json;

    fn token_with(payload: &serde_json::Value) -> String {
        format!(
            "eyJhbGciOiJIUzI1NiJ9.{}.signature",
            URL_SAFE_NO_PAD.encode(payload.to_string())
        )
    }

    #[test]
    fn test_decodes_exp_and_iat() {
        let token = token_with(&json!({"sub": "u1", "exp": 1_700_000_900, "iat": 1_700_000_000}));
        assert_eq!(
            decode_claims(&token),
            Some(DecodedClaims {
                expires_at: 1_700_000_900,
                issued_at: 1_700_000_000
            })
        );
    }

    #[test]
    fn test_url_safe_alphabet_is_translated() {
        // Any aligned "~~~" encodes to "fn5-" in the url-safe alphabet
        let payload = json!({"exp": 10, "iat": 5, "note": "~~~~~~~~~"});
        let encoded = URL_SAFE_NO_PAD.encode(payload.to_string());
        assert!(encoded.contains('-'));

        let token = format!("h.{encoded}.s");
        assert_eq!(decode_claims(&token).unwrap().expires_at, 10);
    }

    #[test]
    fn test_padded_payload_is_accepted() {
        let encoded = STANDARD.encode(json!({"exp": 10, "iat": 5}).to_string());
        assert_eq!(decode_claims(&format!("h.{encoded}.s")).unwrap().issued_at, 5);
    }

    #[test]
    fn test_non_ascii_payload() {
        let token = token_with(&json!({"name": "Zoë", "exp": 42, "iat": 1}));
        assert_eq!(decode_claims(&token).unwrap().expires_at, 42);
    }

    #[test]
    fn test_malformed_tokens_yield_none() {
        assert_eq!(decode_claims(""), None);
        assert_eq!(decode_claims("only-one-segment"), None);
        assert_eq!(decode_claims("a.b"), None);
        assert_eq!(decode_claims("a.b.c.d"), None);
        assert_eq!(decode_claims("h.!!!not-base64!!!.s"), None);
        assert_eq!(decode_claims(&format!("h.{}.s", URL_SAFE_NO_PAD.encode("not json"))), None);
        assert_eq!(decode_claims(&token_with(&json!({"iat": 1}))), None);
        assert_eq!(decode_claims(&token_with(&json!({"exp": "soon", "iat": 1}))), None);
    }

    #[test]
    fn test_expiry_checks() {
        let claims = DecodedClaims {
            expires_at: 1_000,
            issued_at: 0,
        };
        assert!(!claims.is_expired(999_999));
        assert!(claims.is_expired(1_000_000));

        let lead = Duration::from_secs(300);
        assert!(!claims.expires_within(lead, 699_999));
        assert!(claims.expires_within(lead, 700_000));
        assert!(claims.expires_within(lead, 2_000_000));
    }
}
