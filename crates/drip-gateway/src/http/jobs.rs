//! Job ingestion and status endpoints.
//!
//! `POST /jobs` admits a batch; `GET /jobs/{job_id}` reports progress or,
//! on completion, the full per-request result list. Validation failures
//! answer 400 with a descriptive message; unexpected internal failures
//! answer 500 with an opaque one.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use drip_core::InstanceKey;
use drip_engine::{EngineError, SubmitOptions};
use drip_report::JobReport;
use drip_store::{HttpRequestSpec, StoredRequest};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info};

use crate::app::AppState;

/// Routing token header set by the front door. Absent in single-tenant
/// deployments; those land on the `default` instance.
pub const INSTANCE_HEADER: &str = "x-drip-instance";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitJobRequest {
    /// The job name, unique per instance, chosen by the caller.
    pub client_id: String,
    pub requests: Vec<HttpRequestSpec>,
    #[serde(default)]
    pub options: Option<SubmitOptions>,
}

/// POST /jobs
pub async fn submit_job(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<SubmitJobRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let key = instance_key(&headers)?;
    let instance = state
        .instances
        .open(&key)
        .map_err(|e| internal_error(&key, &e.to_string()))?;

    let admitted = instance
        .gate
        .schedule(&payload.client_id, payload.requests, payload.options)
        .map_err(|e| match e {
            EngineError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, Json(json!({"error": msg})))
            }
            other => internal_error(&key, &other.to_string()),
        })?;

    info!(instance = %key, job_id = %admitted.job_id, resuming = admitted.resuming, "submission accepted");

    let mut body = json!({"jobId": admitted.job_id});
    if admitted.resuming {
        body["resuming"] = json!(true);
    }
    Ok(Json(body))
}

/// GET /jobs/{job_id}
pub async fn job_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(job_id): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let key = instance_key(&headers)?;
    let instance = state
        .instances
        .open(&key)
        .map_err(|e| internal_error(&key, &e.to_string()))?;

    let report = instance
        .reporter
        .status(&job_id)
        .map_err(|e| internal_error(&key, &e.to_string()))?;

    match report {
        JobReport::NotFound => Err((
            StatusCode::NOT_FOUND,
            Json(json!({"status": "not_found"})),
        )),
        JobReport::Processing {
            completed,
            total,
            started_at,
            estimated_completion,
        } => Ok(Json(json!({
            "status": "processing",
            "completed": completed,
            "total": total,
            "startedAt": started_at,
            "estimatedCompletion": estimated_completion,
        }))),
        JobReport::Complete { results } => Ok(Json(json!({
            "status": "complete",
            "results": results.iter().map(result_json).collect::<Vec<_>>(),
        }))),
    }
}

/// One completed-job result entry. `responseData` and `error` are omitted
/// entirely when absent rather than serialized as null.
fn result_json(r: &StoredRequest) -> Value {
    let mut obj = serde_json::Map::new();
    obj.insert("url".to_string(), json!(r.spec.url));
    obj.insert("method".to_string(), json!(r.spec.method));
    obj.insert("status".to_string(), json!(r.status));
    if let Some(data) = &r.response_data {
        obj.insert("responseData".to_string(), data.clone());
    }
    if let Some(error) = &r.error {
        obj.insert("error".to_string(), json!(error));
    }
    obj.insert("processedAt".to_string(), json!(r.processed_at));
    Value::Object(obj)
}

fn instance_key(headers: &HeaderMap) -> Result<InstanceKey, (StatusCode, Json<Value>)> {
    let Some(raw) = headers.get(INSTANCE_HEADER) else {
        return Ok(InstanceKey::default());
    };
    let raw = raw.to_str().map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "instance header is not valid UTF-8"})),
        )
    })?;
    InstanceKey::parse(raw)
        .map_err(|e| (StatusCode::BAD_REQUEST, Json(json!({"error": e.to_string()}))))
}

fn internal_error(key: &InstanceKey, detail: &str) -> (StatusCode, Json<Value>) {
    error!(instance = %key, error = %detail, "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": "internal error"})),
    )
}
