use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::services::ClinicDirectory;

#[derive(Clone)]
pub struct ClinicState {
    pub config: Arc<AppConfig>,
    pub directory: Arc<dyn ClinicDirectory>,
}

pub fn clinic_routes(state: ClinicState) -> Router {
    let public_routes = Router::new()
        .route("/", get(handlers::list_clinics))
        .route("/{clinic_id}", get(handlers::get_clinic))
        .route("/{clinic_id}/doctors", get(handlers::list_doctors))
        .route("/doctors/{doctor_id}", get(handlers::get_doctor));

    let protected_routes = Router::new()
        .route("/", post(handlers::create_clinic))
        .route("/{clinic_id}/doctors", post(handlers::create_doctor))
        .route("/doctors/{doctor_id}", put(handlers::update_doctor))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
