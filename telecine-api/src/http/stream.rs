//! Token-gated range streaming endpoint.

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::debug;

use telecine_core::service::catalog::VideoSource;
use telecine_core::upstream::wire::FileLocator;
use telecine_core::Error;

use crate::range::{resolve_range, slice_window, RangeError};

use super::{AppError, AppResult, AppState};

const FILE_HASH_LEN: usize = 6;

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub token: Option<String>,
}

/// GET /api/v1/dl/{id} — stream a file with HTTP Range support, gated
/// by a signed stream token bound to this id.
pub async fn stream_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let token = query
        .token
        .ok_or_else(|| AppError::unauthorized("Stream token required"))?;

    let claims = state.tokens.verify_stream_token(&token, &id)?;
    let source = state.catalog.video_source(&claims).await?;

    let range_header = headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok());

    media_streamer(&state, range_header, &source).await
}

/// OPTIONS /api/v1/dl/{id} — CORS preflight.
pub async fn stream_preflight() -> impl IntoResponse {
    (
        StatusCode::OK,
        [
            ("Access-Control-Allow-Origin", "*"),
            ("Access-Control-Allow-Methods", "GET, OPTIONS"),
            ("Access-Control-Allow-Headers", "Range, Content-Type"),
        ],
    )
}

/// Resolve the locator, verify the token's file hash against it, and
/// frame the ranged response around the byte streamer.
pub(crate) async fn media_streamer(
    state: &AppState,
    range_header: Option<&str>,
    source: &VideoSource,
) -> AppResult<Response> {
    let (client, lease) = state.pool.lease()?;
    debug!(slot_id = lease.slot_id(), "client is now serving a stream");

    let streamer = state.streamers.streamer_for(&client);
    let locator = streamer
        .get_file_properties(source.chat_id, source.msg_id)
        .await?;

    let live_hash: String = locator.unique_id.chars().take(FILE_HASH_LEN).collect();
    if live_hash != source.file_hash {
        debug!(msg_id = source.msg_id, "stale or invalid file hash");
        // The cached locator may be stale; drop it so a retry refetches.
        streamer.invalidate(source.chat_id, source.msg_id);
        return Err(AppError::from(Error::InvalidHash));
    }

    let file_size = locator.file_size;
    let window = match resolve_range(range_header, file_size) {
        Ok(window) => window,
        Err(RangeError::Unsatisfiable) => return Ok(range_not_satisfiable(file_size)),
        Err(RangeError::Malformed) => {
            return Err(AppError::bad_request("Malformed Range header"))
        }
    };
    let slice = slice_window(window, file_size);

    let body = streamer.yield_file(
        locator.clone(),
        lease,
        slice.offset,
        slice.first_cut,
        slice.last_cut,
        slice.part_count,
        slice.chunk_size as u32,
    );

    let (mime_type, file_name) = content_identity(&locator);
    let status = if window.partial {
        StatusCode::PARTIAL_CONTENT
    } else {
        StatusCode::OK
    };

    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, mime_type)
        .header(
            header::CONTENT_RANGE,
            format!("bytes {}-{}/{}", window.from, window.until, file_size),
        )
        .header(header::CONTENT_LENGTH, slice.req_length)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{file_name}\""),
        )
        .header(header::ACCEPT_RANGES, "bytes")
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, OPTIONS")
        .header("Access-Control-Allow-Headers", "Range, Content-Type")
        .body(Body::from_stream(body))
        .map_err(|e| AppError::internal_server_error(format!("Failed to build response: {e}")))
}

fn range_not_satisfiable(file_size: u64) -> Response {
    let mut response = StatusCode::RANGE_NOT_SATISFIABLE.into_response();
    if let Ok(value) = format!("bytes */{file_size}").parse() {
        response.headers_mut().insert(header::CONTENT_RANGE, value);
    }
    response
}

/// Content type and download filename for a locator, synthesizing a
/// `HEX.EXT` name when the upstream file has none.
pub(crate) fn content_identity(locator: &FileLocator) -> (String, String) {
    match (&locator.mime_type, &locator.file_name) {
        (Some(mime), Some(name)) => (mime.clone(), name.clone()),
        (Some(mime), None) => {
            let ext = mime.split('/').nth(1).unwrap_or("unknown");
            (mime.clone(), format!("{}.{ext}", random_hex4()))
        }
        (None, Some(name)) => (guess_mime(name).to_string(), name.clone()),
        (None, None) => (
            "application/octet-stream".to_string(),
            format!("{}.unknown", random_hex4()),
        ),
    }
}

fn random_hex4() -> String {
    format!("{:04x}", rand::random::<u16>())
}

/// Content type guessed from the filename extension.
fn guess_mime(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        "avi" => "video/x-msvideo",
        "mov" => "video/quicktime",
        "ts" => "video/mp2t",
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "flac" => "audio/flac",
        "ogg" => "audio/ogg",
        "srt" => "application/x-subrip",
        "vtt" => "text/vtt",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        _ => "application/octet-stream",
    }
}
