//! Room file handlers.
//!
//! Each handler validates its input before touching the store, then runs
//! one bounded session over a fresh peer. Nothing survives the request.

use std::fmt::Write;
use std::time::{Duration, UNIX_EPOCH};

use axum::{
    Json,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{StatusCode, header},
    response::IntoResponse,
};
use livesync_client::Lookup;
use livesync_types::{FileId, FileRecord, MAX_TIMESTAMP_MS, RoomId};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RoomQuery {
    room: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FileQuery {
    room: Option<String>,
    file: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    room: Option<String>,
    filename: Option<String>,
    content: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FileSummary {
    name: String,
    size: u64,
    #[serde(rename = "type")]
    file_type: String,
    /// RFC 3339, UTC, millisecond precision.
    modified: String,
}

/// Rendered when a timestamp cannot be formatted.
const EPOCH_RFC3339: &str = "1970-01-01T00:00:00.000Z";

/// Epoch milliseconds as RFC 3339. Clamped to year 9999; never panics.
fn format_modified(millis: u64) -> String {
    let since_epoch = Duration::from_millis(millis.min(MAX_TIMESTAMP_MS));
    let Some(time) = UNIX_EPOCH.checked_add(since_epoch) else {
        return EPOCH_RFC3339.to_string();
    };
    let mut out = String::new();
    if write!(out, "{}", humantime::format_rfc3339_millis(time)).is_err() {
        return EPOCH_RFC3339.to_string();
    }
    out
}

impl From<FileRecord> for FileSummary {
    fn from(file: FileRecord) -> Self {
        Self {
            modified: format_modified(file.last_modified),
            name: file.name,
            size: file.size,
            file_type: file.file_type,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    files: Vec<FileSummary>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    success: bool,
    message: &'static str,
    id: FileId,
    created: bool,
    acknowledged: bool,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    success: bool,
    message: &'static str,
    deleted: Vec<FileId>,
}

fn room_param(raw: Option<String>, message: &str) -> AppResult<RoomId> {
    raw.and_then(|r| RoomId::new(r).ok())
        .ok_or_else(|| AppError::bad_request(message))
}

fn name_param(raw: Option<String>, message: &str) -> AppResult<String> {
    raw.filter(|name| !name.trim().is_empty())
        .ok_or_else(|| AppError::bad_request(message))
}

pub async fn list(
    State(state): State<AppState>,
    query: Result<Query<RoomQuery>, QueryRejection>,
) -> AppResult<Json<ListResponse>> {
    let Query(query) = query?;
    let room = room_param(query.room, "Room ID is required")?;

    let files = state.files(room).list().await?;
    debug!(count = files.len(), "Listed room");
    Ok(Json(ListResponse {
        files: files.into_iter().map(FileSummary::from).collect(),
    }))
}

pub async fn download(
    State(state): State<AppState>,
    query: Result<Query<FileQuery>, QueryRejection>,
) -> AppResult<impl IntoResponse> {
    let Query(query) = query?;
    let room = room_param(query.room, "Room and file name required")?;
    let name = name_param(query.file, "Room and file name required")?;

    match state.files(room).find_by_name(&name).await? {
        Lookup::Found(file) => Ok((
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            file.content,
        )),
        Lookup::NotFound { waited } => Err(AppError::not_found_within("File", waited)),
    }
}

pub async fn upload(
    State(state): State<AppState>,
    body: Result<Json<UploadRequest>, JsonRejection>,
) -> AppResult<Json<UploadResponse>> {
    let Json(body) = body?;
    let missing = "Missing room, filename or content";
    let room = room_param(body.room, missing)?;
    let filename = name_param(body.filename, missing)?;
    let content = body.content.ok_or_else(|| AppError::bad_request(missing))?;

    let outcome = state.files(room).upsert(&filename, &content).await?;
    Ok(Json(UploadResponse {
        success: true,
        message: "File uploaded to P2P mesh",
        id: outcome.id,
        created: outcome.created,
        acknowledged: outcome.delivery == livesync_client::Delivery::Acknowledged,
    }))
}

pub async fn preflight() -> StatusCode {
    StatusCode::OK
}

pub async fn delete(
    State(state): State<AppState>,
    query: Result<Query<FileQuery>, QueryRejection>,
) -> AppResult<Json<DeleteResponse>> {
    let Query(query) = query?;
    let room = room_param(query.room, "Missing room or file name")?;
    let name = name_param(query.file, "Missing room or file name")?;

    match state.files(room).delete_by_name(&name).await? {
        Lookup::Found(outcome) => Ok(Json(DeleteResponse {
            success: true,
            message: "Delete signal broadcasted",
            deleted: outcome.ids,
        })),
        Lookup::NotFound { waited } => Err(AppError::not_found_within("File", waited)),
    }
}

pub async fn method_not_allowed() -> AppError {
    AppError::method_not_allowed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_formats_modified_as_rfc3339_millis() {
        let file = FileRecord::with_timestamp(
            FileId::new("abc").unwrap(),
            "a.txt",
            "hi",
            1_700_000_000_123,
        );
        let summary = FileSummary::from(file);
        assert_eq!(summary.modified, "2023-11-14T22:13:20.123Z");
        assert_eq!(summary.size, 2);
        assert_eq!(summary.file_type, "TXT");
    }

    #[test]
    fn test_out_of_range_timestamps_do_not_panic() {
        assert_eq!(format_modified(MAX_TIMESTAMP_MS), "9999-12-31T23:59:59.999Z");
        assert_eq!(format_modified(MAX_TIMESTAMP_MS + 1), "9999-12-31T23:59:59.999Z");

        let file = FileRecord::with_timestamp(FileId::new("abc").unwrap(), "a.txt", "", u64::MAX);
        assert_eq!(FileSummary::from(file).modified, "9999-12-31T23:59:59.999Z");
    }

    #[test]
    fn test_blank_params_are_rejected() {
        assert!(room_param(Some("  ".into()), "m").is_err());
        assert!(name_param(Some("".into()), "m").is_err());
        assert!(name_param(None, "m").is_err());
        assert_eq!(name_param(Some("a.txt".into()), "m").unwrap(), "a.txt");
    }
}
