use std::sync::Arc;

use axum::{routing::post, Router};

use shared_config::AppConfig;

use crate::handlers;
use crate::services::OtpService;

#[derive(Clone)]
pub struct AuthState {
    pub config: Arc<AppConfig>,
    pub otp: Arc<OtpService>,
}

pub fn auth_routes(state: AuthState) -> Router {
    Router::new()
        .route("/validate", post(handlers::validate_token))
        .route("/verify", post(handlers::verify_token))
        .route("/otp/send", post(handlers::send_otp))
        .route("/otp/verify", post(handlers::verify_otp))
        .with_state(state)
}
