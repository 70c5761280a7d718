use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};

use match_provisioning::domain::reservation::reservation::{ReservationDraft, ReservationId, ReservationStatus, ReservationWindow, parse_time};
use match_provisioning::domain::reservation::reservation_client::ReservationClient;
use match_provisioning::domain::reservation::serveme_client::ServemeClient;
use match_provisioning::domain::utils::id::SteamId;
use match_provisioning::error::{Error, ErrorKind, Rejection};

const API_KEY: &str = "test-key";
const STEAM_UID: &str = "76561198000000099";

#[derive(Default)]
struct FakeState {
    create_status: Option<StatusCode>,
    reservations: HashMap<u64, Value>,
    created: Vec<Value>,
    deleted: Vec<u64>,
    queries: Vec<HashMap<String, String>>,
}

type Shared = Arc<Mutex<FakeState>>;

async fn new_window(State(state): State<Shared>, Query(query): Query<HashMap<String, String>>) -> Json<Value> {
    state.lock().unwrap().queries.push(query);
    Json(json!({ "reservation": { "starts_at": "2025-01-01T10:00:00.000+00:00", "ends_at": "2025-01-01T11:00:00.000+00:00" } }))
}

async fn find_servers(State(state): State<Shared>, Query(query): Query<HashMap<String, String>>, Json(body): Json<Value>) -> Json<Value> {
    state.lock().unwrap().queries.push(query);
    assert!(body["reservation"]["starts_at"].is_string());
    Json(json!({
        "servers": [{ "id": 3, "name": "Server #3", "flag": "de", "ip_and_port": "10.0.0.3:27015" }],
        "server_configs": [{ "id": 1, "file": "etf2l_6v6" }],
        "whitelists": [{ "id": 9, "file": "etf2l_whitelist_6v6" }],
        "actions": { "create": "/api/reservations" }
    }))
}

async fn create(State(state): State<Shared>, Query(query): Query<HashMap<String, String>>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    let mut state = state.lock().unwrap();
    state.queries.push(query);
    state.created.push(body.clone());

    match state.create_status {
        Some(status) if status == StatusCode::UNPROCESSABLE_ENTITY => {
            (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({ "reservation": { "errors": { "starts_at": ["can't be in the past"] } } })))
        }
        Some(status) => (status, Json(json!({}))),
        None => {
            let mut reservation = body["reservation"].clone();
            reservation["id"] = json!(42);
            reservation["status"] = json!("requested");
            reservation["server"] = json!({ "id": 3, "name": "Server #3", "ip_and_port": "10.0.0.3:27015" });
            (StatusCode::OK, Json(json!({ "reservation": reservation })))
        }
    }
}

async fn show(State(state): State<Shared>, Path(id): Path<u64>, Query(query): Query<HashMap<String, String>>) -> (StatusCode, Json<Value>) {
    let mut state = state.lock().unwrap();
    state.queries.push(query);
    match state.reservations.get(&id) {
        Some(reservation) => (StatusCode::OK, Json(json!({ "reservation": reservation }))),
        None => (StatusCode::NOT_FOUND, Json(json!({}))),
    }
}

async fn destroy(State(state): State<Shared>, Path(id): Path<u64>) -> StatusCode {
    let mut state = state.lock().unwrap();
    if state.reservations.remove(&id).is_some() {
        state.deleted.push(id);
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn start_fake_serveme(state: Shared) -> String {
    let app = Router::new()
        .route("/api/reservations/new", get(new_window))
        .route("/api/reservations/find_servers", post(find_servers))
        .route("/api/reservations", post(create))
        .route("/api/reservations/:id", get(show).delete(destroy))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind listener");
    let addr: SocketAddr = listener.local_addr().expect("listener addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve fake serveme");
    });
    format!("http://{addr}")
}

fn reservation(id: u64, status: &str, ended: bool) -> Value {
    json!({
        "id": id,
        "status": status,
        "ended": ended,
        "starts_at": "2025-01-01T10:00:00.000+00:00",
        "ends_at": "2025-01-01T11:00:00.000+00:00",
        "server_id": 3,
        "rcon": "rcon-secret",
        "logsecret": "log-secret",
        "zipfile_url": format!("http://demos.example/{id}.zip"),
        "server": { "id": 3, "name": "Server #3", "ip_and_port": "10.0.0.3:27015" }
    })
}

async fn client_with(state: Shared) -> ServemeClient {
    let base_url = start_fake_serveme(state).await;
    ServemeClient::new(&base_url, API_KEY, Duration::from_secs(2)).expect("client")
}

fn identity() -> SteamId {
    SteamId::new(STEAM_UID)
}

fn draft() -> ReservationDraft {
    ReservationDraft {
        window: ReservationWindow::new(parse_time("2025-01-01T10:00:00.000+00:00").unwrap(), parse_time("2025-01-01T11:00:00.000+00:00").unwrap()).unwrap(),
        server_id: 3,
        rcon_password: "rcon".into(),
        server_password: "pw".into(),
        first_map: Some("cp_process_final".into()),
        whitelist_id: Some(9),
        server_config_id: Some(1),
    }
}

#[tokio::test]
async fn every_call_carries_credentials_as_query_parameters() {
    let state = Shared::default();
    let client = client_with(state.clone()).await;

    let window = client.query_upcoming_window(&identity()).await.unwrap();
    assert_eq!(window.starts, parse_time("2025-01-01T10:00:00.000+00:00").unwrap());

    let candidates = client.find_servers(&window, &identity()).await.unwrap();
    assert_eq!(candidates.servers[0].host, "10.0.0.3:27015");
    assert_eq!(candidates.whitelists, vec![(9, "etf2l_whitelist_6v6".to_string())]);

    let queries = state.lock().unwrap().queries.clone();
    assert_eq!(queries.len(), 2);
    for query in queries {
        assert_eq!(query.get("api_key").map(String::as_str), Some(API_KEY));
        assert_eq!(query.get("steam_uid").map(String::as_str), Some(STEAM_UID));
    }
}

#[tokio::test]
async fn create_sends_a_wrapped_reservation_and_decodes_the_answer() {
    let state = Shared::default();
    let client = client_with(state.clone()).await;

    let created = client.create(&draft(), &identity()).await.unwrap();
    assert_eq!(created.id, ReservationId(42));
    assert_eq!(created.status, ReservationStatus::Requested);
    assert!(created.secrets.is_none());

    let body = state.lock().unwrap().created[0].clone();
    assert_eq!(body["reservation"]["starts_at"], "2025-01-01T10:00:00.000+00:00");
    assert_eq!(body["reservation"]["server_id"], 3);
    assert_eq!(body["reservation"]["first_map"], "cp_process_final");
}

#[tokio::test]
async fn create_maps_status_codes_to_specific_rejections() {
    for (status, expected) in [(StatusCode::BAD_REQUEST, Rejection::AlreadyReserved), (StatusCode::NOT_FOUND, Rejection::NotFound)] {
        let state = Shared::default();
        state.lock().unwrap().create_status = Some(status);
        let client = client_with(state).await;

        let err = client.create(&draft(), &identity()).await.unwrap_err();
        assert_eq!(err.rejection(), Some(&expected), "status {}", status);
    }
}

#[tokio::test]
async fn other_rejections_keep_the_error_payload() {
    let state = Shared::default();
    state.lock().unwrap().create_status = Some(StatusCode::UNPROCESSABLE_ENTITY);
    let client = client_with(state).await;

    let err = client.create(&draft(), &identity()).await.unwrap_err();
    match err.rejection() {
        Some(Rejection::Reservation { status, errors }) => {
            assert_eq!(*status, 422);
            assert_eq!(errors["starts_at"], "can't be in the past");
        }
        other => panic!("unexpected rejection {:?}", other),
    }
}

#[tokio::test]
async fn ended_is_true_for_the_flag_or_the_status() {
    let state = Shared::default();
    {
        let mut state = state.lock().unwrap();
        state.reservations.insert(1, reservation(1, "active", true));
        state.reservations.insert(2, reservation(2, "ended", false));
        state.reservations.insert(3, reservation(3, "active", false));
    }
    let client = client_with(state).await;

    assert!(client.ended(ReservationId(1), &identity()).await.unwrap());
    assert!(client.ended(ReservationId(2), &identity()).await.unwrap());
    assert!(!client.ended(ReservationId(3), &identity()).await.unwrap());

    assert_eq!(client.artifact_url(ReservationId(2), &identity()).await.unwrap().as_deref(), Some("http://demos.example/2.zip"));
    assert_eq!(client.artifact_url(ReservationId(3), &identity()).await.unwrap(), None);
}

#[tokio::test]
async fn ended_answers_for_partial_reservations() {
    let state = Shared::default();
    {
        let mut state = state.lock().unwrap();
        state.reservations.insert(1, json!({ "id": 1, "ended": true }));
        state.reservations.insert(2, json!({ "id": 2, "status": "ended", "ended": true }));
        state.reservations.insert(3, json!({ "id": 3, "status": "ended", "starts_at": "2025-01-01 10:00", "zipfile_url": "http://demos.example/3.zip" }));
        state.reservations.insert(4, json!({ "id": 4, "status": "starting" }));
    }
    let client = client_with(state).await;

    assert!(client.ended(ReservationId(1), &identity()).await.unwrap());
    assert!(client.ended(ReservationId(2), &identity()).await.unwrap());
    assert!(client.ended(ReservationId(3), &identity()).await.unwrap());
    assert!(!client.ended(ReservationId(4), &identity()).await.unwrap());

    assert_eq!(client.status(ReservationId(3), &identity()).await.unwrap(), ReservationStatus::Ended);
    assert_eq!(client.artifact_url(ReservationId(3), &identity()).await.unwrap().as_deref(), Some("http://demos.example/3.zip"));
    assert_eq!(client.artifact_url(ReservationId(1), &identity()).await.unwrap(), None);
    assert_eq!(client.status(ReservationId(1), &identity()).await.unwrap_err().kind(), ErrorKind::DecodeFailure);
}

#[tokio::test]
async fn unrecognized_status_is_never_passed_through() {
    let state = Shared::default();
    state.lock().unwrap().reservations.insert(5, reservation(5, "starting", false));
    let client = client_with(state).await;

    let err = client.status(ReservationId(5), &identity()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DecodeFailure);
}

#[tokio::test]
async fn delete_is_idempotent() {
    let state = Shared::default();
    state.lock().unwrap().reservations.insert(42, reservation(42, "active", false));
    let client = client_with(state.clone()).await;

    client.delete(ReservationId(42), &identity()).await.unwrap();
    client.delete(ReservationId(42), &identity()).await.unwrap();
    assert_eq!(state.lock().unwrap().deleted, vec![42]);
}

#[tokio::test]
async fn unreachable_service_is_a_transport_failure() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = ServemeClient::new(&addr.to_string(), API_KEY, Duration::from_secs(1)).unwrap();
    let err = client.query_upcoming_window(&identity()).await.unwrap_err();
    assert!(matches!(err, Error::Transport(_)));
    assert!(err.is_transient());
}
