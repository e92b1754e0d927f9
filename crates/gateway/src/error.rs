use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// Handler-level error: everything unexpected becomes a 500 with a JSON
/// body. Persistence failures deliberately surface this way so the
/// provider's own webhook retry kicks in — ingestion is idempotent.
pub struct ApiError(anyhow::Error);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self.0, "request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
