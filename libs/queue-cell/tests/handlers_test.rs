use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header::AUTHORIZATION, header::CONTENT_TYPE, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use clinic_cell::models::{CreateClinicRequest, CreateDoctorRequest, Doctor};
use clinic_cell::services::{ClinicDirectory, InMemoryDirectory};
use notification_cell::services::{DisabledTransport, EmailService, EmailTransport, HttpEmailTransport};
use queue_cell::*;
use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser};

struct TestApp {
    router: Router,
    secret: String,
    doctor: Doctor,
    doctor_user: TestUser,
}

impl TestApp {
    async fn new() -> Self {
        Self::with_transport(Arc::new(DisabledTransport)).await
    }

    async fn with_transport(transport: Arc<dyn EmailTransport>) -> Self {
        let config = TestConfig::default().to_arc();
        let secret = config.supabase_jwt_secret.clone();

        let directory = Arc::new(InMemoryDirectory::new());
        let clinic = directory
            .create_clinic(CreateClinicRequest {
                name: "Sunrise Clinic".to_string(),
                address: None,
                phone: None,
            })
            .await
            .unwrap();

        let doctor_user = TestUser::doctor("asha@clinic.in");
        let doctor = directory
            .create_doctor(
                clinic.id,
                CreateDoctorRequest {
                    uid: doctor_user.id.clone(),
                    email: "asha@clinic.in".to_string(),
                    phone: "+919876500000".to_string(),
                    name: "Asha Rao".to_string(),
                    specialization: None,
                },
            )
            .await
            .unwrap();

        let state = QueueState {
            config,
            queues: Arc::new(QueueService::new(QueueEventHub::new(), 10, 330, 7)),
            directory,
            email: EmailService::new(transport, "queue@clinic.in"),
        };

        Self {
            router: create_queue_router(state),
            secret,
            doctor,
            doctor_user,
        }
    }

    async fn send(&self, method: &str, uri: &str, user: Option<&TestUser>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header(AUTHORIZATION, JwtTestUtils::bearer(user, &self.secret));
        }
        let request = match body {
            Some(body) => builder
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn open_queue(&self) -> String {
        let (status, queue) = self
            .send(
                "POST",
                "/",
                Some(&self.doctor_user),
                Some(json!({ "doctor_id": self.doctor.id })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        queue["id"].as_str().unwrap().to_string()
    }

    async fn walk_in(&self, queue_id: &str, name: &str, phone: &str) -> Value {
        let (status, body) = self
            .send(
                "POST",
                &format!("/{}/tokens", queue_id),
                Some(&self.doctor_user),
                Some(json!({ "patient_name": name, "phone": phone })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body["token"].clone()
    }
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let app = TestApp::new().await;

    let (status, body) = app.send("POST", "/", None, Some(json!({ "doctor_id": Uuid::new_v4() }))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({ "error": "Unauthorized: No token provided" }));
}

#[tokio::test]
async fn test_open_queue_is_get_or_create() {
    let app = TestApp::new().await;
    let queue_id = app.open_queue().await;

    let (status, queue) = app
        .send("POST", "/", Some(&app.doctor_user), Some(json!({ "doctor_id": app.doctor.id })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(queue["id"], json!(queue_id));

    let patient = TestUser::patient("ravi@mail.in");
    let (status, found) = app
        .send("GET", &format!("/?doctor_id={}", app.doctor.id), Some(&patient), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(found["queue_id"], json!(queue_id));
}

#[tokio::test]
async fn test_other_doctor_cannot_manage_queue() {
    let app = TestApp::new().await;
    let queue_id = app.open_queue().await;
    let stranger = TestUser::doctor("other@clinic.in");

    let (status, _) = app.send("POST", &format!("/{}/call-next", queue_id), Some(&stranger), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.send("GET", &format!("/{}", queue_id), Some(&stranger), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_consultation_flow() {
    let app = TestApp::new().await;
    let queue_id = app.open_queue().await;
    let assistant = TestUser::assistant("desk@clinic.in");

    let first = app.walk_in(&queue_id, "Ravi Kumar", "+919812345670").await;
    let second = app.walk_in(&queue_id, "Meena Iyer", "+919812345671").await;
    assert_eq!(first["token_number"], 1);
    assert_eq!(second["token_number"], 2);

    let (status, _) = app
        .send(
            "PUT",
            &format!("/{}/tokens/{}/emergency", queue_id, second["id"].as_str().unwrap()),
            Some(&assistant),
            Some(json!({ "is_emergency": true })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, called) = app
        .send("POST", &format!("/{}/call-next", queue_id), Some(&assistant), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(called["token_number"], 2);
    assert_eq!(called["status"], "serving");

    let (status, body) = app
        .send("POST", &format!("/{}/call-next", queue_id), Some(&assistant), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Token 2 is still being served");

    let (status, done) = app
        .send(
            "POST",
            &format!("/{}/tokens/{}/complete", queue_id, second["id"].as_str().unwrap()),
            Some(&app.doctor_user),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(done["status"], "completed");

    let (status, board) = app.send("GET", &format!("/{}/board", queue_id), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(board["up_next"][0]["token_number"], 1);
    assert_eq!(board["stats"]["completed"], 1);
    assert!(!board.to_string().contains("Ravi"));

    let (status, position) = app
        .send(
            "GET",
            &format!("/{}/tokens/{}/position", queue_id, first["id"].as_str().unwrap()),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(position["position"], 0);
    assert_eq!(position["estimated_wait_minutes"], 0);
}

#[tokio::test]
async fn test_patient_self_join_and_cancel() {
    let app = TestApp::new().await;
    let queue_id = app.open_queue().await;
    let patient = TestUser::patient("ravi@mail.in").with_phone("+919812345670");

    let (status, joined) = app
        .send(
            "POST",
            &format!("/{}/tokens", queue_id),
            Some(&patient),
            Some(json!({ "patient_name": "Ravi Kumar", "is_emergency": true })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(joined["token"]["patient"]["phone"], "+919812345670");
    assert_eq!(joined["token"]["is_emergency"], false);
    assert_eq!(joined["position"]["position"], 0);

    let (status, body) = app
        .send(
            "POST",
            &format!("/{}/tokens", queue_id),
            Some(&patient),
            Some(json!({ "patient_name": "Ravi Kumar" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Patient already holds token 1 in this queue");

    let token_id = joined["token"]["id"].as_str().unwrap();
    let intruder = TestUser::patient("someone@mail.in").with_phone("+919812345679");
    let (status, _) = app
        .send("POST", &format!("/{}/tokens/{}/cancel", queue_id, token_id), Some(&intruder), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, cancelled) = app
        .send("POST", &format!("/{}/tokens/{}/cancel", queue_id, token_id), Some(&patient), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "cancelled");
}

#[tokio::test]
async fn test_skipped_patient_is_requeued_or_marked_no_show() {
    let app = TestApp::new().await;
    let queue_id = app.open_queue().await;
    let assistant = TestUser::assistant("desk@clinic.in");

    let first = app.walk_in(&queue_id, "Ravi Kumar", "+919812345670").await;
    let second = app.walk_in(&queue_id, "Meena Iyer", "+919812345671").await;
    let first_id = first["id"].as_str().unwrap();
    let second_id = second["id"].as_str().unwrap();

    let (status, skipped) = app
        .send("POST", &format!("/{}/tokens/{}/skip", queue_id, first_id), Some(&assistant), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(skipped["status"], "skipped");

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let (status, requeued) = app
        .send("POST", &format!("/{}/tokens/{}/requeue", queue_id, first_id), Some(&assistant), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(requeued["status"], "waiting");

    // back of the line, behind token 2
    let (_, board) = app.send("GET", &format!("/{}/board", queue_id), None, None).await;
    assert_eq!(board["up_next"][0]["token_number"], 2);
    assert_eq!(board["up_next"][1]["token_number"], 1);

    let (status, body) = app
        .send("POST", &format!("/{}/tokens/{}/requeue", queue_id, second_id), Some(&assistant), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT, "{}", body);

    let (status, called) = app
        .send("POST", &format!("/{}/call-next", queue_id), Some(&assistant), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(called["token_number"], 2);

    let (status, missed) = app
        .send("POST", &format!("/{}/tokens/{}/no-show", queue_id, second_id), Some(&assistant), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(missed["status"], "no_show");

    let (status, _) = app
        .send(
            "POST",
            &format!("/{}/tokens/{}/no-show", queue_id, first_id),
            Some(&TestUser::patient("ravi@mail.in")),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, stats) = app.send("GET", &format!("/{}/stats", queue_id), None, None).await;
    assert_eq!(stats["no_show"], 1);
    assert_eq!(stats["waiting"], 1);
}

#[tokio::test]
async fn test_invalid_phone_is_rejected() {
    let app = TestApp::new().await;
    let queue_id = app.open_queue().await;

    let (status, body) = app
        .send(
            "POST",
            &format!("/{}/tokens", queue_id),
            Some(&app.doctor_user),
            Some(json!({ "patient_name": "Ravi", "phone": "9812345670" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Phone number must start with +91");
}

#[tokio::test]
async fn test_close_marks_no_show_and_blocks_joins() {
    let app = TestApp::new().await;
    let queue_id = app.open_queue().await;
    app.walk_in(&queue_id, "Ravi Kumar", "+919812345670").await;

    let (status, queue) = app
        .send(
            "PUT",
            &format!("/{}/status", queue_id),
            Some(&app.doctor_user),
            Some(json!({ "status": "closed" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(queue["status"], "closed");
    assert_eq!(queue["tokens"][0]["status"], "no_show");

    let (status, _) = app
        .send(
            "POST",
            &format!("/{}/tokens", queue_id),
            Some(&app.doctor_user),
            Some(json!({ "patient_name": "Late Comer", "phone": "+919812345671" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, stats) = app.send("GET", &format!("/{}/stats", queue_id), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["no_show"], 1);
}

#[tokio::test]
async fn test_unknown_queue_is_not_found() {
    let app = TestApp::new().await;
    let (status, body) = app.send("GET", &format!("/{}/board", Uuid::new_v4()), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().starts_with("Queue not found"));
}

#[tokio::test]
async fn test_report_is_mailed_to_doctor() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/verify"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/send"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "msg-1" })))
        .expect(1)
        .mount(&server)
        .await;

    let app = TestApp::with_transport(Arc::new(HttpEmailTransport::new(&server.uri(), "relay-key"))).await;
    let queue_id = app.open_queue().await;

    let (status, result) = app
        .send("POST", &format!("/{}/report", queue_id), Some(&app.doctor_user), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["success"], true);
    assert_eq!(result["message_id"], "msg-1");
}

#[tokio::test]
async fn test_report_failure_is_bad_gateway() {
    let app = TestApp::new().await;
    let queue_id = app.open_queue().await;

    let (status, result) = app
        .send("POST", &format!("/{}/report", queue_id), Some(&app.doctor_user), None)
        .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(result["success"], false);
}
