use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use tracing::{debug, error};

use shared_config::AppConfig;
use shared_models::auth::{JwtClaims, Role, User};
use shared_models::error::AppError;

use crate::jwt::{user_from_claims, validate_token};

pub const NO_TOKEN_MESSAGE: &str = "Unauthorized: No token provided";
pub const INVALID_TOKEN_MESSAGE: &str = "Unauthorized: Invalid token";

/// Returns the bearer token, or `None` when the header is absent, not
/// valid ASCII, uses another scheme, or carries an empty token.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

/// Decodes the bearer token into claims, mapping failures onto the HTTP contract:
/// no token and invalid token are 401, configuration faults are 500.
pub fn authenticate(headers: &HeaderMap, config: &AppConfig) -> Result<JwtClaims, AppError> {
    let token = bearer_token(headers).ok_or_else(|| AppError::Auth(NO_TOKEN_MESSAGE.to_string()))?;

    validate_token(token, &config.supabase_jwt_secret).map_err(|e| {
        if e.is_internal() {
            error!("Token verification failed unexpectedly: {}", e);
            AppError::Internal("Internal server error".to_string())
        } else {
            debug!("Rejected bearer token: {}", e);
            AppError::Auth(INVALID_TOKEN_MESSAGE.to_string())
        }
    })
}

pub async fn auth_middleware(
    State(config): State<Arc<AppConfig>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let claims = authenticate(request.headers(), &config)?;
    let user = user_from_claims(&claims);

    request.extensions_mut().insert(claims);
    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

pub fn require_any_role(user: &User, roles: &[Role]) -> Result<Role, AppError> {
    match user.role() {
        Some(role) if roles.contains(&role) => Ok(role),
        _ => Err(AppError::Forbidden(format!(
            "Requires one of the roles: {}",
            roles.iter().map(Role::as_str).collect::<Vec<_>>().join(", ")
        ))),
    }
}
