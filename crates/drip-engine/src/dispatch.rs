//! Outbound execution of one stored request description.
//!
//! Classification rules:
//! - 2xx with a JSON content type → decode the body as JSON.
//! - 2xx otherwise → capture the raw text (empty body → no data).
//! - non-2xx → record the numeric status, no decoded body.
//! - transport error or decode failure → `Failed` with the error message,
//!   no numeric status.

use drip_store::{HttpRequestSpec, RequestOutcome};
use tracing::debug;

/// Execute the HTTP call described by `spec` and classify the result.
///
/// Never returns `Err`: every failure mode is folded into a terminal
/// [`RequestOutcome`] that the caller records exactly once.
pub async fn execute(client: &reqwest::Client, spec: &HttpRequestSpec) -> RequestOutcome {
    match send(client, spec).await {
        Ok(outcome) => outcome,
        Err(error) => {
            debug!(url = %spec.url, %error, "dispatch failed");
            RequestOutcome::Failed { error }
        }
    }
}

async fn send(
    client: &reqwest::Client,
    spec: &HttpRequestSpec,
) -> std::result::Result<RequestOutcome, String> {
    let method = reqwest::Method::from_bytes(spec.method.to_uppercase().as_bytes())
        .map_err(|_| format!("invalid HTTP method: {}", spec.method))?;

    let mut builder = client.request(method, &spec.url);

    let mut has_content_type = false;
    if let Some(headers) = &spec.headers {
        for (name, value) in headers {
            if name.eq_ignore_ascii_case("content-type") {
                has_content_type = true;
            }
            builder = builder.header(name.as_str(), value.as_str());
        }
    }

    if let Some(body) = &spec.body {
        if !has_content_type {
            builder = builder.header(reqwest::header::CONTENT_TYPE, "application/json");
        }
        builder = builder.body(body.to_string());
    }

    let resp = builder.send().await.map_err(|e| e.to_string())?;
    let status = resp.status();

    if !status.is_success() {
        return Ok(RequestOutcome::Responded {
            status: status.as_u16(),
            response_data: None,
        });
    }

    let is_json = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("json"));

    let text = resp.text().await.map_err(|e| e.to_string())?;
    let response_data = if is_json {
        let value: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| format!("response decode failed: {e}"))?;
        Some(value)
    } else if text.is_empty() {
        None
    } else {
        Some(serde_json::Value::String(text))
    };

    Ok(RequestOutcome::Responded {
        status: status.as_u16(),
        response_data,
    })
}
