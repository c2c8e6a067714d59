use axum::{
    Json,
    extract::{Path, State},
    http::{StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};

use crate::{AppState, api::models::users::CurrentUser, errors::Error};

/// Liveness check
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "expense-management-api",
    }))
}

/// Unknown routes get the usual error envelope
pub async fn not_found() -> Error {
    Error::not_found("Endpoint not found")
}

/// Serve an uploaded file by its path under the upload root.
///
/// Users may only read their own folder; HR may read any.
#[tracing::instrument(skip_all, fields(user_id = %user.id, path = %path))]
pub async fn serve_upload(State(state): State<AppState>, user: CurrentUser, Path(path): Path<String>) -> Result<Response, Error> {
    let full_path = state.files.resolve(&path)?;

    if !user.is_hr() && !full_path.starts_with(state.files.root().join(user.id.to_string())) {
        return Err(Error::Forbidden {
            message: "Unauthorized access".to_string(),
        });
    }

    let bytes = state.files.read(&full_path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::not_found("File not found"),
        _ => Error::Internal {
            operation: format!("serve file {}: {e}", full_path.display()),
        },
    })?;

    let content_type = mime_guess::from_path(&full_path).first_or_octet_stream();
    Ok((StatusCode::OK, [(CONTENT_TYPE, content_type.to_string())], bytes).into_response())
}
