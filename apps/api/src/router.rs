use std::sync::Arc;

use axum::{routing::get, Router};

use auth_cell::{auth_routes, AuthState, OtpService};
use clinic_cell::{clinic_routes, directory_from_config, ClinicDirectory, ClinicState};
use notification_cell::EmailService;
use queue_cell::{create_queue_router, QueueService, QueueState};
use shared_config::AppConfig;

/// Long-lived services shared by the routers and the maintenance task.
#[derive(Clone)]
pub struct AppServices {
    pub config: Arc<AppConfig>,
    pub directory: Arc<dyn ClinicDirectory>,
    pub queues: Arc<QueueService>,
    pub otp: Arc<OtpService>,
    pub email: EmailService,
}

impl AppServices {
    pub fn from_config(config: Arc<AppConfig>) -> Self {
        Self {
            directory: directory_from_config(&config),
            queues: Arc::new(QueueService::from_config(&config)),
            otp: Arc::new(OtpService::from_config(&config)),
            email: EmailService::from_config(&config),
            config,
        }
    }
}

pub fn create_router(services: &AppServices) -> Router {
    let auth_state = AuthState {
        config: services.config.clone(),
        otp: services.otp.clone(),
    };

    let clinic_state = ClinicState {
        config: services.config.clone(),
        directory: services.directory.clone(),
    };

    let queue_state = QueueState {
        config: services.config.clone(),
        queues: services.queues.clone(),
        directory: services.directory.clone(),
        email: services.email.clone(),
    };

    Router::new()
        .route("/", get(|| async { "Clinic Queue API is running!" }))
        .nest("/auth", auth_routes(auth_state))
        .nest("/clinics", clinic_routes(clinic_state))
        .nest("/queues", create_queue_router(queue_state))
}
