use axum::{
    extract::{Multipart, State},
    Json,
};
use serde::Serialize;

use crate::{error::ApiError, routes::UPLOADS_ROUTE, state::AppState};

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub url: String,
    pub name: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub extension: String,
}

/// 去掉路径部分，只保留 `[A-Za-z0-9._-]`，空白换成下划线，并去掉开头的点
pub fn sanitize_filename(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .filter_map(|c| match c {
            c if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') => Some(c),
            c if c.is_whitespace() => Some('_'),
            _ => None,
        })
        .collect();
    cleaned.trim_start_matches('.').to_string()
}

fn extension_of(name: &str) -> Option<String> {
    name.rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
}

pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::bad_request(err.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let original = field.file_name().unwrap_or_default().to_string();
        if original.is_empty() {
            return Err(ApiError::bad_request("No selected file"));
        }

        let name = sanitize_filename(&original);
        let extension = extension_of(&name)
            .filter(|ext| state.uploads.allows(ext))
            .ok_or_else(|| ApiError::bad_request("File type not allowed"))?;

        let mime_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let data = field
            .bytes()
            .await
            .map_err(|err| ApiError::bad_request(err.body_text()))?;

        tokio::fs::create_dir_all(&state.uploads.dir)
            .await
            .map_err(|err| ApiError::internal_server_error(format!("upload directory: {err}")))?;
        tokio::fs::write(state.uploads.dir.join(&name), &data)
            .await
            .map_err(|err| ApiError::internal_server_error(format!("failed to store file: {err}")))?;

        tracing::info!(name = %name, bytes = data.len(), mime_type = %mime_type, "file uploaded");

        return Ok(Json(UploadResponse {
            url: format!("{UPLOADS_ROUTE}/{name}"),
            name,
            mime_type,
            extension,
        }));
    }

    Err(ApiError::bad_request("No file part"))
}
