use std::io::Write;
use std::sync::Arc;

use assert_json_diff::assert_json_eq;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use flate2::write::GzEncoder;
use flate2::Compression;
use http_body_util::BodyExt; // for `collect`
use serde_json::{json, Value};
use tower::ServiceExt; // for `oneshot`

use intake::router::router;
use intake::store::EventStore;

fn test_app() -> Router {
    router(Arc::new(EventStore::new()), false, false)
}

async fn body_json(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn get(app: &Router, uri: &str) -> Response {
    app.clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn post(app: &Router, uri: &str, body: impl Into<Body>) -> Response {
    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(body.into())
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn stored_event_ids(app: &Router) -> Vec<String> {
    let response = get(app, "/api/eventlist/").await;
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await["events"]
        .as_array()
        .unwrap()
        .iter()
        .map(|event| event["event_id"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn index() {
    let app = test_app();

    let response = get(&app, "/").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"intake");
}

#[tokio::test]
async fn store_event_roundtrip() {
    let app = test_app();
    let payload = json!({
        "message": "test error capture",
        "level": "info",
        "timestamp": "2024-05-19T02:22:32.086845Z",
        "sdk": {"name": "sentry.python.flask", "version": "1.45.0"},
    });

    let response = post(&app, "/api/1/store/", serde_json::to_vec(&payload).unwrap()).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_json_eq!(body_json(response).await, json!({"success": true}));

    let response = get(&app, "/api/eventlist/").await;
    let listed = body_json(response).await;
    let events = listed["events"].as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["project_id"], json!(1));
    assert_eq!(events[0]["summary"], json!("test error capture"));

    let event_id = events[0]["event_id"].as_str().unwrap();
    let response = get(&app, &format!("/api/event/{event_id}")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_json_eq!(
        body_json(response).await,
        json!({
            "project_id": 1,
            "event_id": event_id,
            "payload": {
                "envelope_header": null,
                "header": null,
                "body": payload,
            },
        })
    );
}

#[tokio::test]
async fn store_gzip_event_roundtrip() {
    let app = test_app();
    let payload = json!({"message": "compressed hello"});

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&serde_json::to_vec(&payload).unwrap())
        .unwrap();
    let compressed = encoder.finish().unwrap();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/1/store/")
                .header("content-type", "application/json")
                .header("content-encoding", "gzip")
                .body(Body::from(compressed))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let event_ids = stored_event_ids(&app).await;
    assert_eq!(event_ids.len(), 1);

    let response = get(&app, &format!("/api/event/{}", event_ids[0])).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["payload"]["body"], payload);
}

#[tokio::test]
async fn envelope_with_attachment_and_event() {
    let app = test_app();
    let payload: &[u8] = b"{\"event_id\":\"9ec79c33ec9942ab8353589fcb2e04dc\",\"dsn\":\"https://e12d836b15bb49d7bbf99e64295d995b:@sentry.io/42\"}\n\
        {\"type\":\"attachment\",\"length\":10,\"content_type\":\"text/plain\",\"filename\":\"hello.txt\"}\n\
        \xef\xbb\xbfHello\r\n\n\
        {\"type\":\"event\",\"length\":41,\"content_type\":\"application/json\",\"filename\":\"application.log\"}\n\
        {\"message\":\"hello world\",\"level\":\"error\"}\n";

    let response = post(&app, "/api/42/envelope/", payload.to_vec()).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_json_eq!(body_json(response).await, json!({"success": true}));

    let event_ids = stored_event_ids(&app).await;
    assert_eq!(event_ids.len(), 2);

    let envelope_header = json!({
        "event_id": "9ec79c33ec9942ab8353589fcb2e04dc",
        "dsn": "https://e12d836b15bb49d7bbf99e64295d995b:@sentry.io/42",
    });

    // Attachment bytes round-trip exactly; base64 on the wire.
    let response = get(&app, &format!("/api/event/{}", event_ids[0])).await;
    assert_json_eq!(
        body_json(response).await,
        json!({
            "project_id": 42,
            "event_id": event_ids[0],
            "payload": {
                "envelope_header": envelope_header,
                "header": {
                    "type": "attachment",
                    "length": 10,
                    "content_type": "text/plain",
                    "filename": "hello.txt",
                },
                "body": "77u/SGVsbG8NCg==",
            },
        })
    );

    let response = get(&app, &format!("/api/event/{}", event_ids[1])).await;
    let event = body_json(response).await;
    assert_eq!(event["payload"]["envelope_header"], envelope_header);
    assert_eq!(
        event["payload"]["body"],
        json!({"message": "hello world", "level": "error"})
    );
}

#[tokio::test]
async fn envelope_failure_keeps_earlier_items() {
    let app = test_app();
    let payload: &[u8] = b"{}\n\
        {\"type\":\"event\"}\n\
        {\"message\":\"first item\"}\n\
        garbage\n";

    let response = post(&app, "/api/1/envelope/", payload.to_vec()).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    // The item stored before the malformed header stays visible.
    let response = get(&app, "/api/eventlist/").await;
    let listed = body_json(response).await;
    let events = listed["events"].as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["summary"], json!("first item"));
}

#[tokio::test]
async fn unparsable_body_is_stored_as_placeholder() {
    let app = test_app();

    let response = post(&app, "/api/1/store/", &b"definitely not json"[..]).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let response = get(&app, "/api/eventlist/").await;
    let listed = body_json(response).await;
    let events = listed["events"].as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(
        events[0]["summary"],
        json!("could not decode body; see logs")
    );
}

#[tokio::test]
async fn security_csp_report() {
    let app = test_app();
    let payload = json!([
        {
            "age": 0,
            "type": "csp-violation",
            "url": "https://test.example.com/",
            "body": {
                "blockedURL": "https://maps.googleapis.com/maps/api/js",
                "disposition": "enforce",
                "documentURL": "https://test.example.com/",
                "effectiveDirective": "script-src",
            },
        },
    ]);

    let response = post(&app, "/api/1/security/", serde_json::to_vec(&payload).unwrap()).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = get(&app, "/api/eventlist/").await;
    let listed = body_json(response).await;
    assert_eq!(
        listed["events"][0]["summary"],
        json!("csp-report: script-src")
    );
}

#[tokio::test]
async fn event_not_found() {
    let app = test_app();

    let event_id = "019013c5-0d8c-7b64-99a2-645fbd698c34";
    let response = get(&app, &format!("/api/event/{event_id}")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_json_eq!(
        body_json(response).await,
        json!({"error": format!("Event {event_id} not found")})
    );

    // Ids that are not even UUIDs get the same shape.
    let response = get(&app, "/api/event/not-a-uuid").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_json_eq!(
        body_json(response).await,
        json!({"error": "Event not-a-uuid not found"})
    );
}

#[tokio::test]
async fn flush_empties_the_store() {
    let app = test_app();

    let response = post(&app, "/api/1/store/", serde_json::to_vec(&json!({"message": "hi"})).unwrap()).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(stored_event_ids(&app).await.len(), 1);

    let response = post(&app, "/api/flush/", Body::empty()).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_json_eq!(body_json(response).await, json!({"success": true}));
    assert!(stored_event_ids(&app).await.is_empty());

    // Flushing an empty store is fine too.
    let response = post(&app, "/api/flush/", Body::empty()).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(stored_event_ids(&app).await.is_empty());
}
