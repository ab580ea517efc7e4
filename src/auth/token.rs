//! Expiry inspection for signed access/refresh tokens.
//!
//! The client never holds the signing key, so claims are decoded with signature
//! validation disabled to read `exp`. Signature checks stay on the server.

use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::Deserialize;

use crate::client::ClientError;

/// Seconds before expiry at which a token is considered stale
pub const DEFAULT_EXPIRY_BUFFER_SECS: i64 = 60;

#[derive(Debug, Deserialize)]
struct ExpiryClaims {
    #[serde(default)]
    exp: Option<f64>,
}

/// Read the `exp` claim of a token
pub fn decode_expiry(token: &str) -> Result<DateTime<Utc>, ClientError> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let claims = decode::<ExpiryClaims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map(|data| data.claims)
        .map_err(|e| ClientError::MalformedCredential(e.to_string()))?;

    let exp = claims
        .exp
        .ok_or_else(|| ClientError::MalformedCredential("missing exp claim".to_string()))?;

    Utc.timestamp_opt(exp.floor() as i64, 0)
        .single()
        .ok_or_else(|| ClientError::MalformedCredential(format!("exp out of range: {}", exp)))
}

/// True when the token expires within `buffer_secs` from now, or already has
pub fn is_expiring_soon(token: &str, buffer_secs: i64) -> Result<bool, ClientError> {
    is_expiring_soon_at(token, buffer_secs, Utc::now())
}

pub fn is_expiring_soon_at(
    token: &str,
    buffer_secs: i64,
    now: DateTime<Utc>,
) -> Result<bool, ClientError> {
    let expires_at = decode_expiry(token)?;
    Ok(expires_at <= now + chrono::Duration::seconds(buffer_secs))
}

#[cfg(test)]
pub(crate) fn make_token(exp: i64) -> String {
    encode_claims(&serde_json::json!({ "sub": "user-1", "exp": exp }))
}

#[cfg(test)]
pub(crate) fn encode_claims(claims: &serde_json::Value) -> String {
    use jsonwebtoken::{encode, EncodingKey, Header};

    encode(&Header::default(), claims, &EncodingKey::from_secret(b"test-secret"))
        .unwrap()
}

/// Token expiring `secs` seconds from now
#[cfg(test)]
pub(crate) fn token_expiring_in(secs: i64) -> String {
    make_token(Utc::now().timestamp() + secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_past_expiry_is_expiring() {
        for offset in [1, 60, 3600, 86_400 * 365] {
            let token = token_expiring_in(-offset);
            assert!(is_expiring_soon(&token, DEFAULT_EXPIRY_BUFFER_SECS).unwrap());
            assert!(is_expiring_soon(&token, 0).unwrap());
        }
    }

    #[test]
    fn test_far_future_is_not_expiring() {
        for buffer in [0, 30, 60, 600] {
            let token = token_expiring_in(buffer + 61);
            assert!(!is_expiring_soon(&token, buffer).unwrap(), "buffer {}", buffer);
        }
    }

    #[test]
    fn test_within_buffer_is_expiring() {
        let now = Utc::now();
        let token = make_token(now.timestamp() + 30);
        assert!(is_expiring_soon_at(&token, 60, now).unwrap());
        assert!(!is_expiring_soon_at(&token, 10, now).unwrap());
    }

    #[test]
    fn test_decode_expiry() {
        let token = make_token(1_700_000_000);
        assert_eq!(decode_expiry(&token).unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_signature_is_not_checked() {
        let token = make_token(1_700_000_000);
        let (unsigned, _) = token.rsplit_once('.').unwrap();
        let resigned = format!("{}.not-the-server-signature", unsigned);
        assert_eq!(decode_expiry(&resigned).unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_audience_claim_is_ignored() {
        let token = encode_claims(&serde_json::json!({
            "sub": "user-1",
            "aud": "transcript-api",
            "exp": 1_700_000_000
        }));
        assert!(decode_expiry(&token).is_ok());
    }

    #[test]
    fn test_malformed_tokens() {
        let no_exp = encode_claims(&serde_json::json!({ "sub": "user-1" }));
        for token in ["", "abc", "a.b", "a.!!!.c", "a.b.c.d", no_exp.as_str()] {
            assert!(
                matches!(decode_expiry(token), Err(ClientError::MalformedCredential(_))),
                "token {:?}",
                token
            );
        }
    }
}
