use axum::http::StatusCode;

/// Liveness probe. Does not check configuration or the task queue.
#[utoipa::path(
    get,
    path = "/healthz",
    tag = "health",
    responses(
        (status = 200, description = "Service is running"),
    )
)]
pub async fn healthz() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}
