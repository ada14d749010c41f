//! REST route handlers.
//!
//! The surface is read-only: list repositories, list and fetch media, and
//! stream bytes (raw or remuxed). Streams support HTTP range requests and are
//! served with `Content-Disposition: inline`.

use std::io::SeekFrom;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::Response;
use axum::Json;
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

use crate::media::{format, Media};
use crate::meta::Metadata;
use crate::repo::{Capability, Repository};
use crate::server::error::AppError;
use crate::server::AppState;

const RAW_FORMAT: &str = "raw";

#[derive(Debug, Serialize)]
pub struct RepositoryDto {
    pub id: String,
    pub name: String,
    pub capabilities: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct MediaDto {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Metadata>,
}

fn repository_dto(repo: &dyn Repository) -> RepositoryDto {
    RepositoryDto {
        id: repo.id().to_string(),
        name: repo.name().to_string(),
        capabilities: repo.capabilities().names(),
    }
}

fn media_dto(media: Media) -> MediaDto {
    MediaDto {
        id: media.id,
        meta: media.meta,
    }
}

/// GET /repos
pub async fn list_repos(State(state): State<AppState>) -> Json<Vec<RepositoryDto>> {
    let mut repos: Vec<RepositoryDto> = state
        .repos
        .values()
        .map(|r| repository_dto(r.as_ref()))
        .collect();
    repos.sort_by(|a, b| a.id.cmp(&b.id));

    Json(repos)
}

/// GET /repos/:id
pub async fn get_repo(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RepositoryDto>, AppError> {
    let repo = state.repo(&id)?;
    Ok(Json(repository_dto(repo.as_ref())))
}

/// GET /repos/:id/media
pub async fn list_media(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<MediaDto>>, AppError> {
    let repo = state.repo(&id)?;
    let mut media: Vec<MediaDto> = repo.items().await.into_iter().map(media_dto).collect();
    media.sort_by(|a, b| a.id.cmp(&b.id));

    Ok(Json(media))
}

/// GET /repos/:repo_id/media/:media_id
pub async fn get_media(
    State(state): State<AppState>,
    Path((repo_id, media_id)): Path<(String, String)>,
) -> Result<Json<MediaDto>, AppError> {
    let repo = state.repo(&repo_id)?;
    let media = repo
        .get(&media_id)
        .await
        .ok_or_else(|| AppError::not_found("media"))?;

    Ok(Json(media_dto(media)))
}

/// GET /repos/:repo_id/media/:media_id/stream/:format
///
/// `format = "raw"` streams the source file unchanged; any other value
/// requires the remux capability and converts through the mux cache first.
pub async fn stream_media(
    State(state): State<AppState>,
    Path((repo_id, media_id, format_name)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let repo = state.repo(&repo_id)?;

    let media = if format_name == RAW_FORMAT {
        repo.get(&media_id).await
    } else {
        let format = format::find_by_name(&format_name)
            .ok_or_else(|| AppError::unknown_format(&format_name))?;

        if !repo.capabilities().has(Capability::REMUX) {
            return Err(AppError::missing_capability("remux"));
        }

        repo.remux(&media_id, format).await?
    };

    let media = media.ok_or_else(|| AppError::not_found("media"))?;
    serve_file(&media, &headers).await
}

// ---------------------------------------------------------------------------
// File serving with range support
// ---------------------------------------------------------------------------

async fn serve_file(media: &Media, headers: &HeaderMap) -> Result<Response, AppError> {
    let metadata = tokio::fs::metadata(&media.path)
        .await
        .map_err(|_| AppError::not_found("media file"))?;
    let file_size = metadata.len();

    let range = headers
        .get(header::RANGE)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| parse_range_header(s, file_size));

    let mut file = tokio::fs::File::open(&media.path)
        .await
        .map_err(|_| AppError::not_found("media file"))?;

    let response = match range {
        Some((start, end)) => {
            let length = end - start + 1;
            file.seek(SeekFrom::Start(start))
                .await
                .map_err(|e| AppError::from(crate::error::Error::from(e)))?;

            let stream = ReaderStream::new(file.take(length));
            Response::builder()
                .status(StatusCode::PARTIAL_CONTENT)
                .header(header::CONTENT_TYPE, media.mime.as_str())
                .header(header::CONTENT_DISPOSITION, "inline")
                .header(header::CONTENT_LENGTH, length.to_string())
                .header(
                    header::CONTENT_RANGE,
                    format!("bytes {start}-{end}/{file_size}"),
                )
                .header(header::ACCEPT_RANGES, "bytes")
                .body(Body::from_stream(stream))
        }
        None => {
            let stream = ReaderStream::new(file);
            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, media.mime.as_str())
                .header(header::CONTENT_DISPOSITION, "inline")
                .header(header::CONTENT_LENGTH, file_size.to_string())
                .header(header::ACCEPT_RANGES, "bytes")
                .body(Body::from_stream(stream))
        }
    };

    response.map_err(|e| {
        AppError::from(crate::error::Error::tool("http", format!("response build failed: {e}")))
    })
}

/// Parse a `bytes=start-end` range header into an inclusive byte range.
/// Only the first range of a multi-range header is honored.
fn parse_range_header(value: &str, file_size: u64) -> Option<(u64, u64)> {
    let spec = value.strip_prefix("bytes=")?.split(',').next()?.trim();
    let (start, end) = spec.split_once('-')?;

    let range = if start.is_empty() {
        // Suffix form: last N bytes.
        let suffix: u64 = end.parse().ok()?;
        if suffix == 0 {
            return None;
        }
        (file_size.saturating_sub(suffix), file_size - 1)
    } else {
        let start: u64 = start.parse().ok()?;
        let end = if end.is_empty() {
            file_size - 1
        } else {
            end.parse().ok()?
        };
        (start, end.min(file_size - 1))
    };

    (file_size > 0 && range.0 <= range.1 && range.0 < file_size).then_some(range)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_parsing() {
        assert_eq!(parse_range_header("bytes=0-99", 1000), Some((0, 99)));
        assert_eq!(parse_range_header("bytes=500-", 1000), Some((500, 999)));
        assert_eq!(parse_range_header("bytes=-100", 1000), Some((900, 999)));
        assert_eq!(parse_range_header("bytes=0-4999", 1000), Some((0, 999)));
        assert_eq!(parse_range_header("bytes=1000-", 1000), None);
        assert_eq!(parse_range_header("chunks=0-1", 1000), None);
    }
}
