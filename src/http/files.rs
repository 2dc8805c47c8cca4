//! Workspace file access.
//!
//! `GET /api/files?path=<relative>` resolves the path through the sandbox
//! against the configured workspace root. Files are returned as raw bytes,
//! directories as a sorted JSON list of entry names.

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;

use crate::http::request::request_id;
use crate::http::server::AppState;
use crate::security::PathError;

#[derive(Debug, Deserialize)]
pub struct FileQuery {
    #[serde(default)]
    pub path: String,
}

pub async fn read_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<FileQuery>,
) -> Response {
    let resolved = match state.sandbox.resolve(&state.workspace_root, &query.path).await {
        Ok(path) => path,
        Err(e) => {
            tracing::debug!(request_id = %request_id(&headers), kind = e.kind(), "File request refused");
            return e.into_response();
        }
    };

    let metadata = match tokio::fs::metadata(&resolved).await {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return not_found(),
        Err(e) => return PathError::Io(e).into_response(),
    };

    if metadata.is_dir() {
        return match list_dir(&resolved).await {
            Ok(entries) => Json(serde_json::json!({ "entries": entries })).into_response(),
            Err(e) => PathError::Io(e).into_response(),
        };
    }

    match tokio::fs::read(&resolved).await {
        Ok(bytes) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/octet-stream")],
            bytes,
        )
            .into_response(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => not_found(),
        Err(e) => PathError::Io(e).into_response(),
    }
}

async fn list_dir(path: &std::path::Path) -> std::io::Result<Vec<String>> {
    let mut reader = tokio::fs::read_dir(path).await?;
    let mut names = Vec::new();
    while let Some(entry) = reader.next_entry().await? {
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": "File not found" })),
    )
        .into_response()
}
