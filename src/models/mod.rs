//! Core data models for the video storage service.
//!
//! These entities represent stored video assets and the part manifests
//! exchanged during multipart uploads. They map cleanly to database tables
//! via `sqlx::FromRow` and serialize naturally as JSON via `serde`.

pub mod part;
pub mod video;
