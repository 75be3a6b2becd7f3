use std::io::ErrorKind;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::IntoResponse,
};
use tokio_util::io::ReaderStream;
use tracing::error;

use crate::state::AppState;

/// GET /media/{name}: stream a stored attachment back.
pub async fn serve_media(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, StatusCode> {
    // Only names the store itself issues resolve to a path.
    let path = state.media.path_for(&name).ok_or(StatusCode::BAD_REQUEST)?;

    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Err(StatusCode::NOT_FOUND),
        Err(e) => {
            error!("Failed to open attachment {}: {}", path.display(), e);
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };
    let size = file
        .metadata()
        .await
        .map_err(|e| {
            error!("Failed to stat attachment {}: {}", path.display(), e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .len();

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type_for(&name)));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(size));
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000, immutable"),
    );

    Ok((StatusCode::OK, headers, Body::from_stream(ReaderStream::new(file))))
}

fn content_type_for(name: &str) -> &'static str {
    let ext = name.rsplit_once('.').map(|(_, ext)| ext).unwrap_or_default();
    match ext {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::content_type_for;

    #[test]
    fn content_type_follows_extension() {
        assert_eq!(content_type_for("a.jpg"), "image/jpeg");
        assert_eq!(content_type_for("a.mov"), "video/quicktime");
        assert_eq!(content_type_for("noext"), "application/octet-stream");
    }
}
