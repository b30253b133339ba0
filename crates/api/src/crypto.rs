//! HMAC-SHA256 signed, expiring bearer tokens (JWT compact form, HS256).
//!
//! The subject (login email) is the only identity claim; `iat`/`exp` bound
//! the lifetime. Pure Rust, no key files: the server holds one shared secret.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::TokenRejection;

/// JWT header (always HS256).
const JWT_HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

type HmacSha256 = Hmac<Sha256>;

/// Claims carried by every token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: String,
    pub iat: u64,
    pub exp: u64,
}

/// Sign a token for `subject`, valid for `lifetime_secs` from `now_unix`.
pub fn sign_token(subject: &str, secret: &str, now_unix: u64, lifetime_secs: u64) -> String {
    let claims = Claims {
        sub: subject.to_string(),
        iat: now_unix,
        exp: now_unix.saturating_add(lifetime_secs),
    };
    // Serializing a struct of strings and integers cannot fail.
    let payload = serde_json::to_vec(&claims).unwrap_or_default();

    let header_b64 = URL_SAFE_NO_PAD.encode(JWT_HEADER.as_bytes());
    let payload_b64 = URL_SAFE_NO_PAD.encode(payload);
    let signing_input = format!("{header_b64}.{payload_b64}");

    let mut mac = mac_for(secret);
    mac.update(signing_input.as_bytes());
    let sig_b64 = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    format!("{signing_input}.{sig_b64}")
}

/// Verify signature and expiry, returning the claims.
pub fn verify_token(token: &str, secret: &str, now_unix: u64) -> Result<Claims, TokenRejection> {
    let mut parts = token.split('.');
    let (Some(header), Some(payload), Some(signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(TokenRejection::Malformed);
    };

    let signature = URL_SAFE_NO_PAD
        .decode(signature)
        .map_err(|_| TokenRejection::Malformed)?;

    let mut mac = mac_for(secret);
    mac.update(header.as_bytes());
    mac.update(b".");
    mac.update(payload.as_bytes());
    mac.verify_slice(&signature)
        .map_err(|_| TokenRejection::BadSignature)?;

    let payload = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| TokenRejection::Malformed)?;
    let value: serde_json::Value =
        serde_json::from_slice(&payload).map_err(|_| TokenRejection::Malformed)?;

    let exp = value["exp"]
        .as_u64()
        .ok_or(TokenRejection::MissingClaim("exp"))?;
    if now_unix > exp {
        return Err(TokenRejection::Expired);
    }
    let sub = value["sub"]
        .as_str()
        .filter(|s| !s.is_empty())
        .ok_or(TokenRejection::MissingClaim("sub"))?
        .to_string();
    let iat = value["iat"].as_u64().unwrap_or(0);

    Ok(Claims { sub, iat, exp })
}

fn mac_for(secret: &str) -> HmacSha256 {
    // HMAC accepts keys of any length; the error arm is unreachable.
    HmacSha256::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("HMAC can take key of any size"))
}
