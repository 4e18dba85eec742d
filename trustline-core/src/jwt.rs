//! Compact JWS with EdDSA.
//!
//! Used for self-issued access tokens and for badge proofs. Only the
//! `EdDSA` algorithm is produced or accepted.

use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ed25519_dalek::Signature;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::keys::{PrivateKey, PublicKey};
use crate::session::now_unix;

pub const ALGORITHM: &str = "EdDSA";

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("malformed token: {0}")]
    Malformed(&'static str),

    #[error("invalid base64 segment: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("invalid JSON segment: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported algorithm '{0}'")]
    UnsupportedAlgorithm(String),

    #[error("signature verification failed")]
    BadSignature,

    #[error("token expired")]
    Expired,

    #[error("token not valid yet")]
    NotYetValid,
}

/// JOSE header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
}

/// Registered claims of a self-issued access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
}

/// Time claims, tolerant of tokens minted elsewhere.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
struct TimeClaims {
    #[serde(default)]
    exp: Option<i64>,
    #[serde(default)]
    nbf: Option<i64>,
}

/// A token split into its parts.
#[derive(Debug, Clone)]
pub struct Decoded {
    pub header: Header,
    pub payload: Vec<u8>,
    signing_input: String,
    signature: Vec<u8>,
}

/// Sign raw payload bytes.
pub fn sign_payload(payload: &[u8], key: &PrivateKey, typ: Option<&str>) -> Result<String, JwtError> {
    let header = Header {
        alg: ALGORITHM.to_string(),
        typ: typ.map(String::from),
        kid: Some(key.key_id().to_string()),
    };
    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?),
        URL_SAFE_NO_PAD.encode(payload)
    );
    let signature = key.sign(signing_input.as_bytes());
    Ok(format!(
        "{}.{}",
        signing_input,
        URL_SAFE_NO_PAD.encode(signature.to_bytes())
    ))
}

/// Sign a serializable claims set as a JWT.
pub fn sign<T: Serialize>(claims: &T, key: &PrivateKey) -> Result<String, JwtError> {
    sign_payload(&serde_json::to_vec(claims)?, key, Some("JWT"))
}

/// Mint an access token for `client_id` signed by the issuer's key.
pub fn self_issue(
    issuer: &str,
    client_id: &str,
    key: &PrivateKey,
    ttl: Duration,
) -> Result<String, JwtError> {
    let iat = now_unix();
    let ttl = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
    let claims = Claims {
        iss: issuer.to_string(),
        sub: client_id.to_string(),
        aud: None,
        jti: uuid::Uuid::new_v4().to_string(),
        iat,
        exp: iat.saturating_add(ttl),
        nbf: Some(iat),
    };
    sign(&claims, key)
}

/// Split and decode a compact token without verifying it.
pub fn decode(token: &str) -> Result<Decoded, JwtError> {
    let mut parts = token.split('.');
    let (Some(header), Some(payload), Some(signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(JwtError::Malformed("expected three segments"));
    };
    if header.is_empty() || payload.is_empty() {
        return Err(JwtError::Malformed("empty segment"));
    }

    Ok(Decoded {
        header: serde_json::from_slice(&URL_SAFE_NO_PAD.decode(header)?)?,
        payload: URL_SAFE_NO_PAD.decode(payload)?,
        signing_input: format!("{header}.{payload}"),
        signature: URL_SAFE_NO_PAD.decode(signature)?,
    })
}

/// Decode a token and check its EdDSA signature.
pub fn verify_signature(token: &str, key: &PublicKey) -> Result<Decoded, JwtError> {
    let decoded = decode(token)?;
    if decoded.header.alg != ALGORITHM {
        return Err(JwtError::UnsupportedAlgorithm(decoded.header.alg));
    }
    let bytes: [u8; 64] = decoded
        .signature
        .as_slice()
        .try_into()
        .map_err(|_| JwtError::BadSignature)?;
    if !key.verify(decoded.signing_input.as_bytes(), &Signature::from_bytes(&bytes)) {
        return Err(JwtError::BadSignature);
    }
    Ok(decoded)
}

/// Check the `exp` and `nbf` claims of a decoded token against `now`.
pub fn validate_time_claims(decoded: &Decoded, now: i64) -> Result<(), JwtError> {
    let claims: TimeClaims = serde_json::from_slice(&decoded.payload)?;
    if claims.exp.is_some_and(|exp| exp <= now) {
        return Err(JwtError::Expired);
    }
    if claims.nbf.is_some_and(|nbf| nbf > now) {
        return Err(JwtError::NotYetValid);
    }
    Ok(())
}
