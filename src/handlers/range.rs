//! `Range` header parsing.

use crate::errors::S3Error;
use crate::layer::RangeParams;

const BYTES_PREFIX: &str = "bytes=";

/// Parse a `Range` header value against an object of `size` bytes.
///
/// Returns `Ok(None)` when the header is empty, the resolved inclusive
/// range otherwise.  Only single `bytes=` ranges are served:
///
/// - `bytes=A-B` -> `[A, min(B, size - 1)]`
/// - `bytes=A-`  -> `[A, size - 1]`
/// - `bytes=-N`  -> the last `N` bytes, or the whole object if shorter
///
/// Every malformed or unsatisfiable value, and any range against an empty
/// object, is `InvalidRange`.
pub fn fetch_range_header(value: &str, size: u64) -> Result<Option<RangeParams>, S3Error> {
    if value.is_empty() {
        return Ok(None);
    }

    let invalid = || S3Error::InvalidRange { size };

    if size == 0 {
        return Err(invalid());
    }

    let spec = value.strip_prefix(BYTES_PREFIX).ok_or_else(invalid)?;
    if spec.contains(',') {
        return Err(invalid());
    }

    let parts: Vec<&str> = spec.split('-').collect();
    let [start, end] = parts.as_slice() else {
        return Err(invalid());
    };

    // Bounds are plain decimal digits; `u64::from_str` alone would accept `+`.
    let bound = |s: &str| -> Result<u64, S3Error> {
        if !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        s.parse().map_err(|_| invalid())
    };

    let last = size - 1;
    let (start, end) = match (start.is_empty(), end.is_empty()) {
        (true, true) => return Err(invalid()),
        (true, false) => {
            // Suffix range.
            let n = bound(end)?;
            if n == 0 {
                return Err(invalid());
            }
            (size.saturating_sub(n), last)
        }
        (false, true) => (bound(start)?, last),
        (false, false) => {
            let start = bound(start)?;
            let end = bound(end)?;
            if start > end {
                return Err(invalid());
            }
            (start, end.min(last))
        }
    };

    if start >= size || start > end {
        return Err(invalid());
    }

    Ok(Some(RangeParams { start, end }))
}
