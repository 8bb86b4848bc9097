//! src/services/object_store.rs
//!
//! Object-store seam and its filesystem-backed implementation. The upload
//! orchestrator only sees the [`ObjectStore`] trait, so tests can substitute
//! a scripted double and the backing store can change without touching the
//! multipart lifecycle.
//!
//! `FsObjectStore` keeps assembled objects at `base_path/{key}` and in-flight
//! multipart sessions under `base_path/.uploads/{upload_id}/`. A session has
//! no record anywhere else: sessions that are never completed remain on disk
//! until swept externally.

use crate::models::part::CompletedPart;
use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, stream::BoxStream};
use md5::Context;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::{debug, info};
use uuid::Uuid;

/// Minimum size for every part except the last, matching the usual
/// object-store rule. Enforced at completion time, when the final part is
/// known.
pub const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

const MAX_KEY_LEN: usize = 1024;
const UPLOADS_DIR: &str = ".uploads";
const SESSION_KEY_FILE: &str = "key";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no multipart upload with id `{0}`")]
    NoSuchUpload(String),
    #[error("part number {0} is invalid: part numbers start at 1")]
    InvalidPartNumber(i32),
    #[error("part {part_number} is {size} bytes, below the {min}-byte minimum")]
    InvalidPartSize {
        part_number: i32,
        size: u64,
        min: usize,
    },
    #[error("completion manifest rejected: {0}")]
    IncompleteUpload(String),
    #[error("object `{0}` not found")]
    ObjectNotFound(String),
    #[error("invalid object key")]
    InvalidKey,
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Byte stream fed into `upload_part` — the same shape an HTTP body yields.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

/// Result of a successful multipart completion.
#[derive(Debug, Clone)]
pub struct CompletedObject {
    pub size_bytes: i64,
    pub etag: String,
    /// Store-specific reference to the assembled asset.
    pub location: String,
}

/// Open read handle on a stored object, positioned at byte 0.
///
/// The handle is seekable, so callers can serve an arbitrary byte window
/// without materializing the whole asset.
#[derive(Debug)]
pub struct ObjectReader {
    pub file: File,
    pub size_bytes: u64,
}

/// Minimal multipart-capable blob-store interface consumed by the upload
/// orchestrator. Implementations must be safe for concurrent use by multiple
/// in-flight requests.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Open a multipart session for `key` and return its upload id.
    async fn create_multipart_upload(&self, key: &str) -> StoreResult<String>;

    /// Persist one part of an open session and return its ETag. Parts of the
    /// same session may arrive concurrently; no ordering is imposed here.
    async fn upload_part(
        &self,
        upload_id: &str,
        key: &str,
        part_number: i32,
        data: ByteStream,
    ) -> StoreResult<String>;

    /// Assemble the session into a single object. `parts` must list every
    /// part the session received, in ascending order with matching ETags.
    async fn complete_multipart_upload(
        &self,
        upload_id: &str,
        key: &str,
        parts: &[CompletedPart],
    ) -> StoreResult<CompletedObject>;

    /// Open a completed object for seekable reading.
    async fn open_object(&self, key: &str) -> StoreResult<ObjectReader>;

    /// Cheap reachability check used by the readiness probe.
    async fn probe(&self) -> StoreResult<()>;
}

/// Filesystem-backed [`ObjectStore`].
#[derive(Clone, Debug)]
pub struct FsObjectStore {
    /// Root directory for object payloads and session state.
    pub base_path: PathBuf,

    /// Minimum part size enforced at completion (see [`MIN_PART_SIZE`]).
    pub min_part_size: usize,
}

impl FsObjectStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            min_part_size: MIN_PART_SIZE,
        }
    }

    /// Keys are single path segments. Rejects separators, the dot segments
    /// and control characters outright. Dots inside a file name are fine.
    fn ensure_key_safe(key: &str) -> StoreResult<()> {
        if key.is_empty() || key.len() > MAX_KEY_LEN {
            return Err(StoreError::InvalidKey);
        }
        if key.contains('/') || key.contains('\\') || key == "." || key == ".." {
            return Err(StoreError::InvalidKey);
        }
        if key.bytes().any(|b| b.is_ascii_control()) {
            return Err(StoreError::InvalidKey);
        }
        Ok(())
    }

    fn object_path(&self, key: &str) -> PathBuf {
        self.base_path.join(key)
    }

    fn session_dir(&self, upload_id: &str) -> PathBuf {
        self.base_path.join(UPLOADS_DIR).join(upload_id)
    }

    fn part_path(dir: &Path, part_number: i32) -> PathBuf {
        dir.join(format!("part-{:05}", part_number))
    }

    /// Locate a session directory and the key it was opened for.
    ///
    /// Upload ids are UUIDs we minted, so anything that does not parse is
    /// treated as an unknown session rather than touching the filesystem.
    async fn fetch_session(&self, upload_id: &str, key: &str) -> StoreResult<PathBuf> {
        if Uuid::parse_str(upload_id).is_err() {
            return Err(StoreError::NoSuchUpload(upload_id.to_string()));
        }
        let dir = self.session_dir(upload_id);
        let session_key = match fs::read_to_string(dir.join(SESSION_KEY_FILE)).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NoSuchUpload(upload_id.to_string()));
            }
            Err(err) => return Err(StoreError::Io(err)),
        };
        if session_key != key {
            return Err(StoreError::NoSuchUpload(upload_id.to_string()));
        }
        Ok(dir)
    }

    /// Concatenate the manifest's parts into `out`, verifying ETags and the
    /// minimum-size rule along the way. Returns total size and object ETag.
    async fn assemble_parts(
        &self,
        dir: &Path,
        parts: &[CompletedPart],
        out: &mut File,
    ) -> StoreResult<(i64, String)> {
        let mut size_bytes: i64 = 0;
        let mut etag_digest = Context::new();

        for (idx, part) in parts.iter().enumerate() {
            let path = Self::part_path(dir, part.part_number);
            let bytes = match fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    return Err(StoreError::IncompleteUpload(format!(
                        "part {} was never uploaded",
                        part.part_number
                    )));
                }
                Err(err) => return Err(StoreError::Io(err)),
            };

            let is_last = idx == parts.len() - 1;
            if !is_last && bytes.len() < self.min_part_size {
                return Err(StoreError::InvalidPartSize {
                    part_number: part.part_number,
                    size: bytes.len() as u64,
                    min: self.min_part_size,
                });
            }

            let digest = md5::compute(&bytes);
            if format!("{:x}", digest) != part.e_tag {
                return Err(StoreError::IncompleteUpload(format!(
                    "etag mismatch for part {}",
                    part.part_number
                )));
            }

            etag_digest.consume(digest.0);
            size_bytes += bytes.len() as i64;
            out.write_all(&bytes).await?;
        }

        out.flush().await?;
        out.sync_all().await?;

        // S3-style multipart etag: md5 of the concatenated part digests.
        let etag = format!("{:x}-{}", etag_digest.compute(), parts.len());
        Ok((size_bytes, etag))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn create_multipart_upload(&self, key: &str) -> StoreResult<String> {
        Self::ensure_key_safe(key)?;
        let upload_id = Uuid::new_v4().to_string();
        let dir = self.session_dir(&upload_id);
        fs::create_dir_all(&dir).await?;
        fs::write(dir.join(SESSION_KEY_FILE), key).await?;
        debug!("opened multipart session {} for key {}", upload_id, key);
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        upload_id: &str,
        key: &str,
        part_number: i32,
        mut data: ByteStream,
    ) -> StoreResult<String> {
        if part_number < 1 {
            return Err(StoreError::InvalidPartNumber(part_number));
        }
        Self::ensure_key_safe(key)?;
        let dir = self.fetch_session(upload_id, key).await?;

        let tmp_path = dir.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;
        let mut digest = Context::new();
        while let Some(chunk_res) = data.next().await {
            let chunk = match chunk_res {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(StoreError::Io(err));
                }
            };
            digest.consume(&chunk);
            if let Err(err) = file.write_all(&chunk).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StoreError::Io(err));
            }
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }
        drop(file);

        // Last write wins when the same part number is retried.
        fs::rename(&tmp_path, Self::part_path(&dir, part_number)).await?;

        let etag = format!("{:x}", digest.compute());
        debug!(
            "stored part {} of session {} with etag {}",
            part_number, upload_id, etag
        );
        Ok(etag)
    }

    async fn complete_multipart_upload(
        &self,
        upload_id: &str,
        key: &str,
        parts: &[CompletedPart],
    ) -> StoreResult<CompletedObject> {
        Self::ensure_key_safe(key)?;
        let dir = self.fetch_session(upload_id, key).await?;

        if parts.is_empty() {
            return Err(StoreError::IncompleteUpload("empty part list".into()));
        }
        // Manifest must be 1..=N, ascending, no gaps.
        for (idx, part) in parts.iter().enumerate() {
            let expected = idx as i32 + 1;
            if part.part_number != expected {
                return Err(StoreError::IncompleteUpload(format!(
                    "expected part number {}, got {}",
                    expected, part.part_number
                )));
            }
        }

        // It must also cover exactly the parts this session received.
        let mut received = 0usize;
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_name().to_string_lossy().starts_with("part-") {
                received += 1;
            }
        }
        if received != parts.len() {
            return Err(StoreError::IncompleteUpload(format!(
                "manifest lists {} parts but session holds {}",
                parts.len(),
                received
            )));
        }

        let tmp_path = self.base_path.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut out = File::create(&tmp_path).await?;
        let (size_bytes, etag) = match self.assemble_parts(&dir, parts, &mut out).await {
            Ok(assembled) => assembled,
            Err(err) => {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(err);
            }
        };
        drop(out);

        let object_path = self.object_path(key);
        if let Err(err) = fs::rename(&tmp_path, &object_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }

        if let Err(err) = fs::remove_dir_all(&dir).await {
            debug!(
                "failed to remove session directory {}: {}",
                dir.display(),
                err
            );
        }

        info!(
            "completed multipart session {} into {} ({} bytes, {} parts)",
            upload_id,
            object_path.display(),
            size_bytes,
            parts.len()
        );

        Ok(CompletedObject {
            size_bytes,
            etag,
            location: format!("file://{}", object_path.display()),
        })
    }

    async fn open_object(&self, key: &str) -> StoreResult<ObjectReader> {
        Self::ensure_key_safe(key)?;
        let path = self.object_path(key);
        let file = match File::open(&path).await {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(StoreError::ObjectNotFound(key.to_string()));
            }
            Err(err) => return Err(StoreError::Io(err)),
        };
        let size_bytes = file.metadata().await?.len();
        Ok(ObjectReader { file, size_bytes })
    }

    async fn probe(&self) -> StoreResult<()> {
        let tmp_path = self.base_path.join(format!(".probe-{}", Uuid::new_v4()));
        fs::write(&tmp_path, b"probe").await?;
        let contents = fs::read(&tmp_path).await?;
        let _ = fs::remove_file(&tmp_path).await;
        if contents != b"probe" {
            return Err(StoreError::Io(io::Error::new(
                ErrorKind::InvalidData,
                "probe readback mismatch",
            )));
        }
        Ok(())
    }
}
