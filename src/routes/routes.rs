//! Defines routes for the video upload/download API.
//!
//! ## Structure
//! - **Upload endpoints**
//!   - `POST /upload/initiate?fileName=` — open a multipart session
//!   - `POST /upload/part?uploadId=&fileName=&partNumber=` — upload one part (raw body)
//!   - `POST /upload/complete?uploadId=&fileName=` — assemble the session (JSON manifest)
//!
//! - **Read endpoints**
//!   - `GET /list?page=&size=` — paginated metadata listing
//!   - `GET /download/{fileName}` — full or ranged download (`Range` header)
//!
//! Health probes are mounted at `/healthz` and `/readyz`.

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        video_handlers::{
            complete_upload, download_video, initiate_upload, list_videos, upload_part,
        },
    },
    services::video_service::VideoService,
};
use axum::{
    Router,
    routing::{get, post},
};

/// Build and return the router for all video endpoints.
///
/// The router carries shared state (`VideoService`) to all handlers.
pub fn routes() -> Router<VideoService> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // upload lifecycle
        .route("/upload/initiate", post(initiate_upload))
        .route("/upload/part", post(upload_part))
        .route("/upload/complete", post(complete_upload))
        // read side
        .route("/list", get(list_videos))
        .route("/download/{fileName}", get(download_video))
}
