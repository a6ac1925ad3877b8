use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tokio::time::timeout;

use super::data_source::*;

/// How long the store gets to answer before the pod reports unready.
const STORE_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

#[tracing::instrument]
pub async fn handler(data_src: StateDataSource) -> Response {
    let component = data_src.component();
    let failure = |message: String| {
        let body = json!({ "status": "failure", "component": component, "message": message });
        (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
    };

    match timeout(STORE_CHECK_TIMEOUT, data_src.is_ready()).await {
        Ok(Ok(())) => (StatusCode::OK, Json(json!({ "status": "ok" }))).into_response(),
        Ok(Err(e)) => failure(e.to_string()),
        Err(_) => failure(format!(
            "no answer within {} seconds",
            STORE_CHECK_TIMEOUT.as_secs()
        )),
    }
}
