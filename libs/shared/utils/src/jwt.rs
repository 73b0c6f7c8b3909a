use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{TimeZone, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;
use tracing::debug;

use shared_models::auth::{JwtClaims, JwtHeader, User};

type HmacSha256 = Hmac<Sha256>;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum JwtError {
    #[error("JWT secret is not set")]
    MissingSecret,

    #[error("Invalid token format")]
    Malformed,

    #[error("Unsupported token algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Invalid token signature")]
    BadSignature,

    #[error("Invalid claims encoding")]
    BadClaims,

    #[error("Token expired")]
    Expired,

    #[error("Failed to sign token")]
    Signing,
}

impl JwtError {
    /// Configuration problems are server faults; everything else is the caller's token.
    pub fn is_internal(&self) -> bool {
        matches!(self, JwtError::MissingSecret | JwtError::Signing)
    }
}

fn new_mac(jwt_secret: &str) -> Result<HmacSha256, JwtError> {
    HmacSha256::new_from_slice(jwt_secret.as_bytes()).map_err(|_| JwtError::Signing)
}

pub fn validate_token(token: &str, jwt_secret: &str) -> Result<JwtClaims, JwtError> {
    if jwt_secret.is_empty() {
        return Err(JwtError::MissingSecret);
    }

    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(JwtError::Malformed);
    }

    let header_b64 = parts[0];
    let claims_b64 = parts[1];
    let signature_b64 = parts[2];

    let header: JwtHeader = URL_SAFE_NO_PAD
        .decode(header_b64)
        .ok()
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        .ok_or(JwtError::Malformed)?;

    if header.alg != "HS256" {
        debug!("Rejecting token signed with {}", header.alg);
        return Err(JwtError::UnsupportedAlgorithm(header.alg));
    }

    let signature = URL_SAFE_NO_PAD.decode(signature_b64).map_err(|e| {
        debug!("Failed to decode signature: {}", e);
        JwtError::BadSignature
    })?;

    let mut mac = new_mac(jwt_secret)?;
    mac.update(format!("{}.{}", header_b64, claims_b64).as_bytes());

    if mac.verify_slice(&signature).is_err() {
        debug!("Token signature verification failed");
        return Err(JwtError::BadSignature);
    }

    let claims_bytes = URL_SAFE_NO_PAD
        .decode(claims_b64)
        .map_err(|_| JwtError::BadClaims)?;

    let claims: JwtClaims = serde_json::from_slice(&claims_bytes).map_err(|e| {
        debug!("Failed to parse claims: {}", e);
        JwtError::BadClaims
    })?;

    if let Some(exp) = claims.exp {
        let now = Utc::now().timestamp() as u64;
        if exp < now {
            debug!("Token expired at {} (now: {})", exp, now);
            return Err(JwtError::Expired);
        }
    }

    debug!("Token validated successfully for subject: {}", claims.sub);
    Ok(claims)
}

pub fn user_from_claims(claims: &JwtClaims) -> User {
    let created_at = claims
        .iat
        .and_then(|timestamp| Utc.timestamp_opt(timestamp as i64, 0).single());

    User {
        id: claims.sub.clone(),
        email: claims.email.clone(),
        phone: claims.phone.clone(),
        role: claims.role.clone(),
        metadata: claims.user_metadata.clone(),
        created_at,
    }
}

/// Signs `claims` as an HS256 JWT.
pub fn sign_token(claims: &JwtClaims, jwt_secret: &str) -> Result<String, JwtError> {
    if jwt_secret.is_empty() {
        return Err(JwtError::MissingSecret);
    }

    let header = JwtHeader {
        alg: "HS256".to_string(),
        typ: "JWT".to_string(),
    };

    let header_json = serde_json::to_vec(&header).map_err(|_| JwtError::Signing)?;
    let claims_json = serde_json::to_vec(claims).map_err(|_| JwtError::Signing)?;

    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(header_json),
        URL_SAFE_NO_PAD.encode(claims_json)
    );

    let mut mac = new_mac(jwt_secret)?;
    mac.update(signing_input.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    Ok(format!("{}.{}", signing_input, signature))
}
