//! End-to-end gateway exercise: submit a batch against a local stub target,
//! poll until complete, and check the duplicate / validation / not-found
//! answers along the way.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::routing::get;
use axum::Router;
use drip_core::DripConfig;
use drip_gateway::{app, instances::InstanceRouter};
use serde_json::{json, Value};
use tower::ServiceExt;

/// Stub target the engine dispatches against.
async fn serve_target() -> SocketAddr {
    let router = Router::new().route(
        "/{*path}",
        get(
            |axum::extract::Path(path): axum::extract::Path<String>| async move {
                axum::Json(json!({"echo": path}))
            },
        ),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

fn gateway(data_dir: &std::path::Path) -> (Router, tokio::sync::watch::Sender<bool>) {
    let mut config = DripConfig::default();
    config.database.dir = data_dir.to_string_lossy().into_owned();

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let instances = InstanceRouter::new(&config, shutdown_rx).unwrap();
    instances.recover_all().unwrap();
    let state = Arc::new(app::AppState::new(config, instances));
    (app::build_router(state), shutdown_tx)
}

async fn call(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post_jobs(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/jobs")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_status(job_id: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(format!("/jobs/{job_id}"))
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn submit_then_poll_to_completion() {
    let dir = tempfile::tempdir().unwrap();
    let (router, _shutdown) = gateway(dir.path());
    let target = serve_target().await;

    let (status, body) = call(
        &router,
        post_jobs(json!({
            "clientId": "j1",
            "requests": [
                {"url": format!("http://{target}/a"), "method": "GET"},
                {"url": format!("http://{target}/b"), "method": "GET"}
            ],
            "options": {"rateLimit": 2, "unit": "second"}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"jobId": "j1"}));

    // immediate poll: the drain is still pacing itself
    let (status, body) = call(&router, get_status("j1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "processing");
    assert_eq!(body["total"], 2);

    // resolved count only ever grows until the job flips to complete
    let mut last_completed = 0u64;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(15);
    let results = loop {
        assert!(
            tokio::time::Instant::now() < deadline,
            "job never completed"
        );
        let (_, body) = call(&router, get_status("j1")).await;
        match body["status"].as_str().unwrap() {
            "processing" => {
                let completed = body["completed"].as_u64().unwrap();
                assert!(completed >= last_completed);
                last_completed = completed;
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            "complete" => break body["results"].clone(),
            other => panic!("unexpected status {other}"),
        }
    };

    let results = results.as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["url"], format!("http://{target}/a"));
    assert_eq!(results[1]["url"], format!("http://{target}/b"));
    for r in results {
        assert_eq!(r["status"], 200);
        assert_eq!(r["method"], "GET");
        assert!(r["processedAt"].is_string());
        assert!(r.get("error").is_none());
    }
    assert_eq!(results[0]["responseData"], json!({"echo": "a"}));

    // duplicate submission: nothing re-runs, the caller is told to poll
    let (status, body) = call(
        &router,
        post_jobs(json!({
            "clientId": "j1",
            "requests": [{"url": format!("http://{target}/other"), "method": "GET"}]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"jobId": "j1", "resuming": true}));
}

#[tokio::test]
async fn validation_failures_answer_400_and_change_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let (router, _shutdown) = gateway(dir.path());

    let (status, body) = call(
        &router,
        post_jobs(json!({"clientId": "j1", "requests": []})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("requests"));

    let (status, _) = call(
        &router,
        post_jobs(json!({
            "clientId": "j1",
            "requests": [{"url": "https://x/a", "method": "GET"}],
            "options": {"rateLimit": -1, "unit": "minute"}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // neither attempt created the job
    let (status, body) = call(&router, get_status("j1")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"status": "not_found"}));
}

#[tokio::test]
async fn instances_do_not_share_jobs() {
    let dir = tempfile::tempdir().unwrap();
    let (router, _shutdown) = gateway(dir.path());
    let target = serve_target().await;

    let mut request = post_jobs(json!({
        "clientId": "j1",
        "requests": [{"url": format!("http://{target}/a"), "method": "GET"}]
    }));
    request
        .headers_mut()
        .insert("x-drip-instance", "tenant-a".parse().unwrap());
    let (status, _) = call(&router, request).await;
    assert_eq!(status, StatusCode::OK);

    // tenant-b has never heard of j1
    let mut request = get_status("j1");
    request
        .headers_mut()
        .insert("x-drip-instance", "tenant-b".parse().unwrap());
    let (status, _) = call(&router, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // and a hostile routing token never reaches the filesystem
    let mut request = get_status("j1");
    request
        .headers_mut()
        .insert("x-drip-instance", "../escape".parse().unwrap());
    let (status, _) = call(&router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
