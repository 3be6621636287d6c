use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Access/refresh credential pair as persisted and as returned by the refresh endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl CredentialPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

#[derive(Deserialize)]
struct Claims {
    exp: Option<f64>,
}

/// Reads the `exp` claim of a JWT-shaped token without verifying its signature
pub fn decode_expiry(token: &str) -> Option<DateTime<Utc>> {
    let mut segments = token.split('.');
    let (_header, payload) = (segments.next()?, segments.next()?);

    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: Claims = serde_json::from_slice(&bytes).ok()?;
    let exp = claims.exp.filter(|exp| exp.is_finite())?;

    DateTime::from_timestamp(exp.trunc() as i64, 0)
}

/// True if the token's expiry is in the past or the token cannot be decoded.
pub fn is_expired(token: &str) -> bool {
    is_expired_at(token, Utc::now())
}

/// [`is_expired`] against a fixed instant
pub fn is_expired_at(token: &str, now: DateTime<Utc>) -> bool {
    match decode_expiry(token) {
        Some(expiry) => expiry <= now,
        None => true,
    }
}

/// Unsigned JWT-shaped token whose `exp` lies `secs` from now (negative: already expired)
#[cfg(test)]
pub(crate) fn token_expiring_in(secs: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let claims = serde_json::json!({
        "sub": "user-1",
        "jti": uuid::Uuid::new_v4().to_string(),
        "exp": Utc::now().timestamp() + secs,
    });
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.signature")
}
