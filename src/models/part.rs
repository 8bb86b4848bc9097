//! Part manifest entries supplied when completing a multipart upload.

use serde::{Deserialize, Serialize};

/// One `(partNumber, eTag)` pair from the completion manifest.
///
/// The ETag must be the exact value the store returned when the part was
/// uploaded. Part numbers are 1-based and the manifest must be sorted
/// ascending.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CompletedPart {
    #[serde(rename = "partNumber")]
    pub part_number: i32,

    #[serde(rename = "eTag")]
    pub e_tag: String,
}
