use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use pipeline::HttpErrorReporter;
use sanction_api::{ErrorKind, ErrorReporter, InboundRecord, RecordHeader};

#[derive(Clone, Default)]
struct Received(Arc<Mutex<Vec<(HeaderMap, String)>>>);

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
    format!("http://{addr}")
}

async fn endpoint(status: StatusCode) -> (String, Received) {
    let received = Received::default();
    let app = Router::new()
        .route(
            "/errors",
            post(move |State(rx): State<Received>, headers: HeaderMap, body: String| async move {
                rx.0.lock().unwrap().push((headers, body));
                status
            }),
        )
        .with_state(received.clone());
    (format!("{}/errors", serve(app).await), received)
}

fn record() -> InboundRecord {
    InboundRecord {
        topic: "payments".into(),
        partition: 0,
        offset: 7,
        key: None,
        payload: vec![],
        headers: vec![
            RecordHeader::new("X-B3-TraceId", "4bf92f3577b34da6a3ce929d0e0e4736"),
            RecordHeader::new("requestId", "REQ-1"),
            RecordHeader::new("not a header", "dropped"),
        ],
    }
}

#[tokio::test]
async fn posts_message_with_forwarded_headers() {
    let (url, received) = endpoint(StatusCode::OK).await;
    let reporter = HttpErrorReporter::new(&url, Duration::from_secs(5)).unwrap();

    reporter.report(&record(), "Processing error: boom").await.unwrap();

    let calls = received.0.lock().unwrap();
    assert_eq!(calls.len(), 1);
    let (headers, body) = &calls[0];
    assert_eq!(headers["x-b3-traceid"], "4bf92f3577b34da6a3ce929d0e0e4736");
    assert_eq!(headers["requestid"], "REQ-1");
    assert_eq!(headers["content-type"], "application/json");
    let body: serde_json::Value = serde_json::from_str(body).unwrap();
    assert_eq!(body, serde_json::json!({ "msg": "Processing error: boom" }));
}

#[tokio::test]
async fn non_success_status_is_an_error() {
    let (url, received) = endpoint(StatusCode::SERVICE_UNAVAILABLE).await;
    let reporter = HttpErrorReporter::new(&url, Duration::from_secs(5)).unwrap();

    let err = reporter.report(&record(), "Processing error: boom").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transient);
    assert!(err.message().contains("503"), "{err}");
    // single attempt, no retry
    assert_eq!(received.0.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn slow_endpoint_hits_the_timeout() {
    let app = Router::new().route(
        "/errors",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            StatusCode::OK
        }),
    );
    let url = format!("{}/errors", serve(app).await);
    let reporter = HttpErrorReporter::new(&url, Duration::from_millis(200)).unwrap();

    let err = reporter.report(&record(), "Processing error: boom").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transient);
}
