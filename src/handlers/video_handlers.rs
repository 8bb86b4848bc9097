//! HTTP handlers for the video upload, listing and download endpoints.
//! Streams request and response bodies to avoid buffering whole assets and
//! delegates all storage concerns to `VideoService`.

use crate::{
    errors::AppError,
    models::part::CompletedPart,
    services::{
        range::{self, RangeError},
        video_service::{VideoError, VideoService},
    },
};
use axum::{
    Json,
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::SecondsFormat;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::io::{self, SeekFrom};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct InitiateQuery {
    #[serde(rename = "fileName")]
    pub file_name: String,
}

#[derive(Debug, Deserialize)]
pub struct PartQuery {
    #[serde(rename = "uploadId")]
    pub upload_id: String,
    #[serde(rename = "fileName")]
    pub file_name: String,
    #[serde(rename = "partNumber")]
    pub part_number: i32,
}

#[derive(Debug, Deserialize)]
pub struct CompleteQuery {
    #[serde(rename = "uploadId")]
    pub upload_id: String,
    #[serde(rename = "fileName")]
    pub file_name: String,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page: Option<i64>,
    pub size: Option<i64>,
}

/// Listing DTO: only the fields the listing endpoint exposes.
#[derive(Debug, Serialize)]
pub struct VideoSummary {
    pub id: Uuid,
    #[serde(rename = "fileName")]
    pub file_name: String,
    #[serde(rename = "uploadDate")]
    pub upload_date: String,
}

/// POST `/upload/initiate?fileName=` — open a multipart session.
pub async fn initiate_upload(
    State(service): State<VideoService>,
    Query(q): Query<InitiateQuery>,
) -> Result<String, AppError> {
    Ok(service.initiate_upload(&q.file_name).await?)
}

/// POST `/upload/part?uploadId=&fileName=&partNumber=` — raw part bytes in
/// the body, streamed through to the store. Responds with the part's ETag.
pub async fn upload_part(
    State(service): State<VideoService>,
    Query(q): Query<PartQuery>,
    body: Body,
) -> Result<String, AppError> {
    let stream = body
        .into_data_stream()
        .map(|chunk| chunk.map_err(|err| io::Error::new(io::ErrorKind::Other, err)))
        .boxed();

    let etag = service
        .upload_part(&q.upload_id, &q.file_name, q.part_number, stream)
        .await?;
    Ok(etag)
}

/// POST `/upload/complete?uploadId=&fileName=` — JSON part manifest in the
/// body. Empty 200 on success.
pub async fn complete_upload(
    State(service): State<VideoService>,
    Query(q): Query<CompleteQuery>,
    Json(parts): Json<Vec<CompletedPart>>,
) -> Result<StatusCode, AppError> {
    service
        .complete_upload(&q.upload_id, &q.file_name, &parts)
        .await?;
    Ok(StatusCode::OK)
}

/// GET `/list?page=&size=` — paginated video metadata, newest first.
pub async fn list_videos(
    State(service): State<VideoService>,
    Query(q): Query<ListQuery>,
) -> Result<Json<Vec<VideoSummary>>, AppError> {
    let videos = service
        .list_videos(q.page.unwrap_or(0), q.size.unwrap_or(10))
        .await?;

    let summaries = videos
        .into_iter()
        .map(|video| VideoSummary {
            id: video.id,
            file_name: video.file_name,
            upload_date: video
                .upload_date
                .to_rfc3339_opts(SecondsFormat::Millis, true),
        })
        .collect();
    Ok(Json(summaries))
}

/// GET `/download/{fileName}` — full body (200) or partial content (206)
/// when a `Range` header is present. Only the requested window is read.
pub async fn download_video(
    State(service): State<VideoService>,
    Path(file_name): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let reader = service.open_download(&file_name).await?;
    let total = reader.size_bytes;
    let mut file = reader.file;

    let range_header = headers.get(header::RANGE).and_then(|v| v.to_str().ok());
    let resolved = match range::resolve(range_header, total) {
        Ok(resolved) => resolved,
        Err(err) => return Ok(range_not_satisfiable(err, total)),
    };

    let mut response = match resolved {
        Some(range) => {
            file.seek(SeekFrom::Start(range.start))
                .await
                .map_err(VideoError::Io)?;
            let stream = ReaderStream::new(file.take(range.len()));

            let mut response = Response::new(Body::from_stream(stream));
            *response.status_mut() = StatusCode::PARTIAL_CONTENT;
            let resp_headers = response.headers_mut();
            if let Ok(value) = HeaderValue::from_str(&range.content_range()) {
                resp_headers.insert(header::CONTENT_RANGE, value);
            }
            resp_headers.insert(header::CONTENT_LENGTH, HeaderValue::from(range.len()));
            response
        }
        None => {
            let stream = ReaderStream::new(file);

            let mut response = Response::new(Body::from_stream(stream));
            let resp_headers = response.headers_mut();
            resp_headers.insert(header::CONTENT_LENGTH, HeaderValue::from(total));
            let disposition = format!("attachment; filename=\"{}\"", file_name);
            if let Ok(value) = HeaderValue::from_str(&disposition) {
                resp_headers.insert(header::CONTENT_DISPOSITION, value);
            }
            response
        }
    };

    let resp_headers = response.headers_mut();
    resp_headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    resp_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    Ok(response)
}

/// 416 response carrying the `Content-Range: bytes */{total}` hint.
fn range_not_satisfiable(err: RangeError, total: u64) -> Response {
    let body = Json(serde_json::json!({
        "error": err.to_string(),
        "status": StatusCode::RANGE_NOT_SATISFIABLE.as_u16()
    }));
    let mut response = (StatusCode::RANGE_NOT_SATISFIABLE, body).into_response();
    if let Ok(value) = HeaderValue::from_str(&format!("bytes */{}", total)) {
        response.headers_mut().insert(header::CONTENT_RANGE, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::routes::routes;
    use crate::services::{object_store::FsObjectStore, video_service::VideoService};
    use axum::{Router, body::to_bytes, http::Request};
    use sqlx::sqlite::SqlitePoolOptions;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tower::ServiceExt;

    async fn test_app(dir: &TempDir) -> Router {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let schema = include_str!("../../migrations/0001_init.sql");
        for stmt in schema.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(stmt).execute(&pool).await.unwrap();
        }
        let store = Arc::new(FsObjectStore::new(dir.path()));
        routes().with_state(VideoService::new(Arc::new(pool), store))
    }

    async fn get(app: Router, uri: &str, range: Option<&str>) -> Response {
        let mut request = Request::builder().uri(uri);
        if let Some(range) = range {
            request = request.header(header::RANGE, range);
        }
        app.oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    #[tokio::test]
    async fn ranged_download_returns_partial_content() {
        let dir = TempDir::new().unwrap();
        tokio::fs::write(dir.path().join("movie.mp4"), vec![7u8; 2048])
            .await
            .unwrap();
        let app = test_app(&dir).await;

        let response = get(app, "/download/movie.mp4", Some("bytes=0-1023")).await;
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(
            response.headers()[header::CONTENT_RANGE],
            "bytes 0-1023/2048"
        );
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "1024");
        assert_eq!(response.headers()[header::ACCEPT_RANGES], "bytes");

        let body = body_bytes(response).await;
        assert_eq!(body.len(), 1024);
        assert!(body.iter().all(|b| *b == 7));
    }

    #[tokio::test]
    async fn full_download_sets_attachment_headers() {
        let dir = TempDir::new().unwrap();
        tokio::fs::write(dir.path().join("movie.mp4"), b"0123456789")
            .await
            .unwrap();
        let app = test_app(&dir).await;

        let response = get(app, "/download/movie.mp4", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"movie.mp4\""
        );
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "10");
        assert_eq!(response.headers()[header::ACCEPT_RANGES], "bytes");
        assert_eq!(body_bytes(response).await, b"0123456789");
    }

    #[tokio::test]
    async fn bad_ranges_return_416_with_total_hint() {
        let dir = TempDir::new().unwrap();
        tokio::fs::write(dir.path().join("movie.mp4"), vec![0u8; 2048])
            .await
            .unwrap();
        let app = test_app(&dir).await;

        let response = get(app.clone(), "/download/movie.mp4", Some("bytes=5000-")).await;
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes */2048");

        let response = get(app, "/download/movie.mp4", Some("bytes=abc-def")).await;
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes */2048");
    }

    #[tokio::test]
    async fn missing_asset_returns_404() {
        let dir = TempDir::new().unwrap();
        let app = test_app(&dir).await;

        let response = get(app, "/download/nope.mp4", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn upload_lifecycle_over_http() {
        let dir = TempDir::new().unwrap();
        let app = test_app(&dir).await;

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/upload/initiate?fileName=movie.mp4")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let upload_id = String::from_utf8(body_bytes(response).await).unwrap();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!(
                        "/upload/part?uploadId={}&fileName=movie.mp4&partNumber=1",
                        upload_id
                    ))
                    .body(Body::from("hello"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let etag = String::from_utf8(body_bytes(response).await).unwrap();

        let manifest = serde_json::json!([{ "partNumber": 1, "eTag": etag }]);
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!(
                        "/upload/complete?uploadId={}&fileName=movie.mp4",
                        upload_id
                    ))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(manifest.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = get(app, "/list?page=0&size=10", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let listed: serde_json::Value =
            serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(listed[0]["fileName"], "movie.mp4");
    }
}
