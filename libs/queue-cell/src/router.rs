use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use clinic_cell::services::ClinicDirectory;
use notification_cell::services::EmailService;
use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::services::QueueService;
use crate::websocket;

#[derive(Clone)]
pub struct QueueState {
    pub config: Arc<AppConfig>,
    pub queues: Arc<QueueService>,
    pub directory: Arc<dyn ClinicDirectory>,
    pub email: EmailService,
}

pub fn create_queue_router(state: QueueState) -> Router {
    let public_routes = Router::new()
        .route("/{queue_id}/board", get(handlers::get_board))
        .route("/{queue_id}/stats", get(handlers::get_stats))
        .route("/{queue_id}/tokens/{token_id}/position", get(handlers::get_position))
        .route("/{queue_id}/live", get(websocket::queue_live));

    let protected_routes = Router::new()
        .route("/", post(handlers::open_queue).get(handlers::find_queue))
        .route("/{queue_id}", get(handlers::get_queue))
        .route("/{queue_id}/status", put(handlers::update_queue_status))
        .route("/{queue_id}/tokens", post(handlers::join_queue))
        .route("/{queue_id}/call-next", post(handlers::call_next))
        .route("/{queue_id}/tokens/{token_id}/call", post(handlers::call_token))
        .route("/{queue_id}/tokens/{token_id}/complete", post(handlers::complete_token))
        .route("/{queue_id}/tokens/{token_id}/skip", post(handlers::skip_token))
        .route("/{queue_id}/tokens/{token_id}/no-show", post(handlers::mark_no_show))
        .route("/{queue_id}/tokens/{token_id}/requeue", post(handlers::requeue_token))
        .route("/{queue_id}/tokens/{token_id}/emergency", put(handlers::set_emergency))
        .route("/{queue_id}/tokens/{token_id}/cancel", post(handlers::cancel_token))
        .route("/{queue_id}/report", post(handlers::send_report))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
