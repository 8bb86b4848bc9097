//! Represents a video asset persisted after a completed multipart upload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Metadata record for a single stored video.
///
/// A row is written exactly once, when a multipart upload completes. The
/// record describes where the bytes live, not the bytes themselves.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Video {
    /// Internal UUID assigned when the record is inserted.
    pub id: Uuid,

    /// File name of the asset, unique per logical video.
    pub file_name: String,

    /// Size in bytes, reported by the object store at completion time.
    pub file_size: Option<i64>,

    /// Object-store reference for the assembled asset.
    pub storage_url: String,

    /// Free-form upload state string.
    pub upload_status: Option<String>,

    /// Free-form download state string (currently unused).
    pub download_status: Option<String>,

    /// When the upload completed.
    pub upload_date: DateTime<Utc>,
}
