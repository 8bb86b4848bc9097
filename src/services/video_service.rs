//! src/services/video_service.rs
//!
//! Upload Orchestrator — drives the three-phase multipart lifecycle against
//! the object store and records completed assets in SQLite. No retries
//! anywhere: every failure surfaces synchronously to the HTTP layer.

use crate::models::{part::CompletedPart, video::Video};
use crate::services::object_store::{ByteStream, ObjectReader, ObjectStore, StoreError};
use chrono::Utc;
use sqlx::SqlitePool;
use std::{io, sync::Arc};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

/// Hard cap on the page size accepted by `list_videos`.
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Error)]
pub enum VideoError {
    #[error("object store unavailable: {0}")]
    StoreUnavailable(StoreError),
    #[error("{0}")]
    InvalidPart(StoreError),
    #[error("{0}")]
    IncompleteUpload(StoreError),
    #[error("video `{0}` not found")]
    NotFound(String),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<StoreError> for VideoError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidPartNumber(_)
            | StoreError::InvalidPartSize { .. }
            | StoreError::InvalidKey => VideoError::InvalidPart(err),
            StoreError::NoSuchUpload(_) | StoreError::IncompleteUpload(_) => {
                VideoError::IncompleteUpload(err)
            }
            StoreError::ObjectNotFound(key) => VideoError::NotFound(key),
            StoreError::Io(_) => VideoError::StoreUnavailable(err),
        }
    }
}

/// Orchestrates multipart uploads, listing and downloads.
///
/// Holds only stateless, concurrency-safe clients: the SQLite pool for
/// metadata and the injected object-store handle. Cloning is cheap and each
/// HTTP request operates on its own clone.
#[derive(Clone)]
pub struct VideoService {
    /// Shared SQLite connection pool for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Multipart-capable object store holding the video bytes.
    pub store: Arc<dyn ObjectStore>,
}

impl VideoService {
    pub fn new(db: Arc<SqlitePool>, store: Arc<dyn ObjectStore>) -> Self {
        Self { db, store }
    }

    /// Open a multipart session for `file_name`. No local state is created.
    pub async fn initiate_upload(&self, file_name: &str) -> Result<String, VideoError> {
        let upload_id = self.store.create_multipart_upload(file_name).await?;
        info!(
            "initiated multipart upload {} for {}",
            upload_id, file_name
        );
        Ok(upload_id)
    }

    /// Forward one part's bytes to the store and return its ETag. Parts of a
    /// session may be uploaded concurrently; assembly order is fixed only by
    /// the manifest supplied at completion time.
    pub async fn upload_part(
        &self,
        upload_id: &str,
        file_name: &str,
        part_number: i32,
        data: ByteStream,
    ) -> Result<String, VideoError> {
        let etag = self
            .store
            .upload_part(upload_id, file_name, part_number, data)
            .await?;
        debug!(
            "uploaded part {} for upload {} with etag {}",
            part_number, upload_id, etag
        );
        Ok(etag)
    }

    /// Complete a multipart session and persist the video record.
    ///
    /// Completion is exactly-once per upload id: a session already present in
    /// `completed_uploads` is acknowledged without touching the store or
    /// writing a second record. The store-side completion and the metadata
    /// write are not atomic with each other — a DB failure after the store
    /// confirms leaves an orphan object in storage (accepted gap).
    pub async fn complete_upload(
        &self,
        upload_id: &str,
        file_name: &str,
        parts: &[CompletedPart],
    ) -> Result<(), VideoError> {
        if self.is_completed(upload_id).await? {
            info!("upload {} already completed, skipping", upload_id);
            return Ok(());
        }

        let object = self
            .store
            .complete_multipart_upload(upload_id, file_name, parts)
            .await?;

        let mut tx = self.db.begin().await?;
        let marked = sqlx::query(
            "INSERT OR IGNORE INTO completed_uploads (upload_id, file_name, completed_at)
             VALUES (?, ?, ?)",
        )
        .bind(upload_id)
        .bind(file_name)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;
        if marked.rows_affected() == 0 {
            // Lost a race with a concurrent completion of the same session.
            tx.rollback().await?;
            return Ok(());
        }

        // Re-uploading an existing file name overwrites its record, matching
        // the store's last-write-wins object semantics.
        sqlx::query(
            "INSERT INTO videos (id, file_name, file_size, storage_url, upload_status,
                                 download_status, upload_date)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(file_name) DO UPDATE SET
                 file_size = excluded.file_size,
                 storage_url = excluded.storage_url,
                 upload_status = excluded.upload_status,
                 upload_date = excluded.upload_date",
        )
        .bind(Uuid::new_v4())
        .bind(file_name)
        .bind(object.size_bytes)
        .bind(&object.location)
        .bind("completed")
        .bind::<Option<String>>(None)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        info!(
            "completed upload {} for {} ({} bytes, etag {})",
            upload_id, file_name, object.size_bytes, object.etag
        );
        Ok(())
    }

    /// List stored videos, newest first (`upload_date DESC, id DESC`).
    /// `page` is zero-indexed; `size` is clamped to 1..=[`MAX_PAGE_SIZE`].
    pub async fn list_videos(&self, page: i64, size: i64) -> Result<Vec<Video>, VideoError> {
        let size = size.clamp(1, MAX_PAGE_SIZE);
        let offset = page.max(0).saturating_mul(size);
        let videos = sqlx::query_as::<_, Video>(
            "SELECT id, file_name, file_size, storage_url, upload_status,
                    download_status, upload_date
             FROM videos
             ORDER BY upload_date DESC, id DESC
             LIMIT ? OFFSET ?",
        )
        .bind(size)
        .bind(offset)
        .fetch_all(&*self.db)
        .await?;
        Ok(videos)
    }

    /// Open a stored video for seekable reading. An I/O failure reading the
    /// asset is a local server error, not store unavailability.
    pub async fn open_download(&self, file_name: &str) -> Result<ObjectReader, VideoError> {
        self.store
            .open_object(file_name)
            .await
            .map_err(|err| match err {
                StoreError::Io(err) => VideoError::Io(err),
                other => other.into(),
            })
    }

    async fn is_completed(&self, upload_id: &str) -> Result<bool, sqlx::Error> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT upload_id FROM completed_uploads WHERE upload_id = ?")
                .bind(upload_id)
                .fetch_optional(&*self.db)
                .await?;
        Ok(row.is_some())
    }
}
