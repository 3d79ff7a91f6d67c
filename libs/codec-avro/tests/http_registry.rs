use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use codec_avro::registry::REGISTRY_CONTENT_TYPE;
use codec_avro::{HttpSchemaRegistry, RegistryError, SchemaRegistry, WireCodec};
use sanction_api::{ErrorKind, PaymentPayload, ScaledAmount};
use serde_json::{json, Value};

#[derive(Clone, Default)]
struct FakeRegistry {
    schemas: Arc<Mutex<Vec<(String, String)>>>,
}

async fn register(
    State(fake): State<FakeRegistry>,
    Path(subject): Path<String>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<Value>, StatusCode> {
    if headers.get(header::CONTENT_TYPE).map(|v| v.as_bytes()) != Some(REGISTRY_CONTENT_TYPE.as_bytes()) {
        return Err(StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }
    let request: Value = serde_json::from_str(&body).map_err(|_| StatusCode::UNPROCESSABLE_ENTITY)?;
    let schema = request["schema"].as_str().ok_or(StatusCode::UNPROCESSABLE_ENTITY)?;
    let mut schemas = fake.schemas.lock().unwrap();
    let id = match schemas.iter().position(|(_, s)| s == schema) {
        Some(i) => i + 1,
        None => {
            schemas.push((subject, schema.to_string()));
            schemas.len()
        }
    };
    Ok(Json(json!({ "id": id })))
}

async fn by_id(
    State(fake): State<FakeRegistry>,
    Path(id): Path<usize>,
) -> Result<Json<Value>, StatusCode> {
    let schemas = fake.schemas.lock().unwrap();
    let (_, schema) = id
        .checked_sub(1)
        .and_then(|i| schemas.get(i))
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(json!({ "schema": schema })))
}

async fn latest(
    State(fake): State<FakeRegistry>,
    Path(subject): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    let schemas = fake.schemas.lock().unwrap();
    let (i, (_, schema)) = schemas
        .iter()
        .enumerate()
        .rev()
        .find(|(_, (s, _))| *s == subject)
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(json!({ "id": i + 1, "version": 1, "schema": schema })))
}

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
    format!("http://{addr}")
}

async fn fake_registry() -> String {
    let app = Router::new()
        .route("/subjects/{subject}/versions", post(register))
        .route("/subjects/{subject}/versions/latest", get(latest))
        .route("/schemas/ids/{id}", get(by_id))
        .with_state(FakeRegistry::default());
    serve(app).await
}

#[tokio::test]
async fn rest_calls_round_trip() {
    let url = fake_registry().await;
    let registry = HttpSchemaRegistry::new(&format!("{url}/"), Duration::from_secs(5)).unwrap();

    let id = registry.register("payments-value", "\"string\"").await.unwrap();
    assert_eq!(id, 1);
    assert_eq!(registry.schema_by_id(id).await.unwrap(), "\"string\"");
    assert_eq!(registry.latest("payments-value").await.unwrap().id, 1);

    let err = registry.schema_by_id(99).await.unwrap_err();
    assert!(matches!(err, RegistryError::NotFound(_)));
    assert_eq!(err.kind(), ErrorKind::Format);
}

#[tokio::test]
async fn codec_over_http() {
    let url = fake_registry().await;
    let registry = Arc::new(HttpSchemaRegistry::new(&url, Duration::from_secs(5)).unwrap());
    let codec = WireCodec::new(registry, true);

    let p = PaymentPayload {
        request_id: "REQ-1".into(),
        created_at: 1_700_000_000_000,
        status: "CREATED".into(),
        total: ScaledAmount::from_unscaled(1250),
        username_from: "alice".into(),
        username_from_address: "1 Main St".into(),
        username_to: "bob".into(),
        username_to_address: "2 Side St".into(),
    };
    let frame = codec.encode_payment("payments", &p).await.unwrap();
    assert_eq!(codec.decode("payments", &frame).await.unwrap(), p);
}

#[tokio::test]
async fn unreachable_registry_is_transient() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let registry =
        HttpSchemaRegistry::new(&format!("http://{addr}"), Duration::from_secs(2)).unwrap();
    let err = registry.schema_by_id(1).await.unwrap_err();
    assert!(matches!(err, RegistryError::Transport { .. }));
    assert_eq!(err.kind(), ErrorKind::Transient);
}
