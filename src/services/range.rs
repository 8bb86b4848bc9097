//! Range Resolver — turns an HTTP `Range` header into a byte-slice plan.
//!
//! Only the single-range `bytes=<start>-[<end>]` form is supported. Malformed
//! or out-of-bounds ranges fail with a deterministic [`RangeError`] (HTTP 416)
//! instead of falling back to a full-body response.

use thiserror::Error;

/// Inclusive byte window over an asset of known total length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
    pub total: u64,
}

impl ByteRange {
    /// Number of bytes covered by the window.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Exact `Content-Range` value for a 206 response.
    pub fn content_range(&self) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, self.total)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RangeError {
    #[error("malformed range header `{0}`")]
    Malformed(String),
    #[error("range {start}-{end} is not satisfiable for length {total}")]
    Unsatisfiable { start: u64, end: u64, total: u64 },
}

/// Resolve an optional `Range` header against a known total length.
///
/// Returns `Ok(None)` when no header is present (full-body response) and
/// `Ok(Some(range))` for a satisfiable request. The start offset is required;
/// an absent end (`bytes=N-`) runs to the last byte, and an end past the
/// asset is clamped to `total - 1`. Suffix ranges (`bytes=-N`) and multiple
/// ranges are rejected as malformed.
pub fn resolve(header: Option<&str>, total: u64) -> Result<Option<ByteRange>, RangeError> {
    let Some(raw) = header else {
        return Ok(None);
    };

    let Some(rest) = raw.trim().strip_prefix("bytes=") else {
        return Err(RangeError::Malformed(raw.to_string()));
    };
    let Some((start_str, end_str)) = rest.split_once('-') else {
        return Err(RangeError::Malformed(raw.to_string()));
    };

    let start: u64 = start_str
        .trim()
        .parse()
        .map_err(|_| RangeError::Malformed(raw.to_string()))?;

    let end_str = end_str.trim();
    let end: u64 = if end_str.is_empty() {
        total.saturating_sub(1)
    } else {
        end_str
            .parse()
            .map_err(|_| RangeError::Malformed(raw.to_string()))?
    };
    let end = end.min(total.saturating_sub(1));

    if total == 0 || start >= total || start > end {
        return Err(RangeError::Unsatisfiable { start, end, total });
    }

    Ok(Some(ByteRange { start, end, total }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_header_means_full_body() {
        assert_eq!(resolve(None, 2048), Ok(None));
    }

    #[test]
    fn explicit_range_reproduces_offsets() {
        let range = resolve(Some("bytes=0-1023"), 2048).unwrap().unwrap();
        assert_eq!(range.start, 0);
        assert_eq!(range.end, 1023);
        assert_eq!(range.len(), 1024);
        assert_eq!(range.content_range(), "bytes 0-1023/2048");
    }

    #[test]
    fn open_ended_range_runs_to_eof() {
        let range = resolve(Some("bytes=100-"), 2048).unwrap().unwrap();
        assert_eq!(range.end, 2047);
        assert_eq!(range.len(), 1948);
    }

    #[test]
    fn end_past_total_is_clamped() {
        let range = resolve(Some("bytes=10-99999"), 2048).unwrap().unwrap();
        assert_eq!(range.end, 2047);
        assert_eq!(range.content_range(), "bytes 10-2047/2048");
    }

    #[test]
    fn start_past_total_is_unsatisfiable() {
        assert_eq!(
            resolve(Some("bytes=2048-"), 2048),
            Err(RangeError::Unsatisfiable {
                start: 2048,
                end: 2047,
                total: 2048
            })
        );
    }

    #[test]
    fn inverted_range_is_unsatisfiable() {
        assert!(matches!(
            resolve(Some("bytes=10-5"), 2048),
            Err(RangeError::Unsatisfiable { .. })
        ));
    }

    #[test]
    fn empty_asset_never_satisfies_a_range() {
        assert!(matches!(
            resolve(Some("bytes=0-"), 0),
            Err(RangeError::Unsatisfiable { .. })
        ));
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            resolve(Some("bytes=abc-def"), 2048),
            Err(RangeError::Malformed(_))
        ));
        assert!(matches!(
            resolve(Some("items=0-10"), 2048),
            Err(RangeError::Malformed(_))
        ));
        assert!(matches!(
            resolve(Some("bytes=0-1,5-9"), 2048),
            Err(RangeError::Malformed(_))
        ));
        // Suffix form is unsupported: start is required.
        assert!(matches!(
            resolve(Some("bytes=-500"), 2048),
            Err(RangeError::Malformed(_))
        ));
    }

    #[test]
    fn single_byte_windows_work_at_both_edges() {
        let first = resolve(Some("bytes=0-0"), 2048).unwrap().unwrap();
        assert_eq!(first.len(), 1);
        let last = resolve(Some("bytes=2047-2047"), 2048).unwrap().unwrap();
        assert_eq!(last.len(), 1);
        assert_eq!(last.content_range(), "bytes 2047-2047/2048");
    }
}
