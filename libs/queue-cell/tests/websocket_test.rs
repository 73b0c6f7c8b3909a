use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use futures::StreamExt;
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::{tungstenite, MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

use clinic_cell::models::{CreateClinicRequest, CreateDoctorRequest, Doctor};
use clinic_cell::services::{ClinicDirectory, InMemoryDirectory};
use notification_cell::services::{DisabledTransport, EmailService};
use queue_cell::*;
use shared_utils::test_utils::TestConfig;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct LiveServer {
    queues: Arc<QueueService>,
    doctor: Doctor,
    addr: std::net::SocketAddr,
    handle: JoinHandle<()>,
}

impl LiveServer {
    async fn start() -> Self {
        let directory = Arc::new(InMemoryDirectory::new());
        let clinic = directory
            .create_clinic(CreateClinicRequest {
                name: "Sunrise Clinic".to_string(),
                address: None,
                phone: None,
            })
            .await
            .unwrap();
        let doctor = directory
            .create_doctor(
                clinic.id,
                CreateDoctorRequest {
                    uid: Uuid::new_v4().to_string(),
                    email: "asha@clinic.in".to_string(),
                    phone: "+919876500000".to_string(),
                    name: "Asha Rao".to_string(),
                    specialization: None,
                },
            )
            .await
            .unwrap();

        let queues = Arc::new(QueueService::new(QueueEventHub::new(), 10, 330, 7));
        let state = QueueState {
            config: TestConfig::default().to_arc(),
            queues: queues.clone(),
            directory,
            email: EmailService::new(Arc::new(DisabledTransport), "queue@clinic.in"),
        };
        let app = create_queue_router(state);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            queues,
            doctor,
            addr,
            handle,
        }
    }

    fn live_url(&self, queue_id: Uuid) -> String {
        format!("ws://{}/{}/live", self.addr, queue_id)
    }

    async fn connect(&self, queue_id: Uuid) -> Client {
        let (ws, _) = tokio_tungstenite::connect_async(self.live_url(queue_id))
            .await
            .expect("websocket connect failed");
        ws
    }
}

fn patient(n: u32) -> PatientInfo {
    PatientInfo {
        name: format!("Patient {}", n),
        phone: format!("+91987650{:04}", n),
    }
}

async fn next_event(ws: &mut Client) -> Value {
    let message = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timed out waiting for an event")
        .expect("stream ended")
        .expect("websocket error");
    serde_json::from_str(message.to_text().unwrap()).unwrap()
}

#[tokio::test]
async fn test_snapshot_then_live_events() {
    let server = LiveServer::start().await;
    let (queue, _) = server.queues.get_or_create_queue(&server.doctor, None).await.unwrap();
    let first = server.queues.join(queue.id, patient(1), false, None).await.unwrap();

    let mut ws = server.connect(queue.id).await;

    let snapshot = next_event(&mut ws).await;
    assert_eq!(snapshot["type"], "snapshot");
    assert_eq!(snapshot["queue_id"], queue.id.to_string());
    assert_eq!(snapshot["board"]["up_next"].as_array().unwrap().len(), 1);

    let second = server.queues.join(queue.id, patient(2), false, None).await.unwrap();
    let joined = next_event(&mut ws).await;
    assert_eq!(joined["type"], "token_joined");
    assert_eq!(joined["token"]["token_number"], second.token_number);

    server.queues.call_next(queue.id).await.unwrap();
    let called = next_event(&mut ws).await;
    assert_eq!(called["type"], "token_status_changed");
    assert_eq!(called["from"], "waiting");
    assert_eq!(called["to"], "serving");
    assert_eq!(called["token"]["token_number"], first.token_number);

    let _ = ws.close(None).await;
    server.handle.abort();
}

#[tokio::test]
async fn test_lagging_subscriber_gets_fresh_snapshot() {
    let server = LiveServer::start().await;
    let (queue, _) = server.queues.get_or_create_queue(&server.doctor, None).await.unwrap();

    let mut ws = server.connect(queue.id).await;
    assert_eq!(next_event(&mut ws).await["type"], "snapshot");

    // Overflow the per-queue channel before the socket task can drain it
    let queues = server.queues.clone();
    tokio::task::unconstrained(async move {
        for n in 0..150 {
            queues.join(queue.id, patient(n), false, None).await.unwrap();
        }
    })
    .await;

    let resync = next_event(&mut ws).await;
    assert_eq!(resync["type"], "snapshot");
    assert_eq!(resync["board"]["up_next"].as_array().unwrap().len(), 150);

    let _ = ws.close(None).await;
    server.handle.abort();
}

#[tokio::test]
async fn test_unknown_queue_is_rejected_before_upgrade() {
    let server = LiveServer::start().await;

    let result = tokio_tungstenite::connect_async(server.live_url(Uuid::new_v4())).await;

    assert_matches!(
        result,
        Err(tungstenite::Error::Http(response)) if response.status() == 404
    );
    server.handle.abort();
}
