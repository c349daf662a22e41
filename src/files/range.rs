//! Byte-range parsing for `Range: bytes=...` requests.

/// Parses the part of a `Range` header after `=` as a comma-separated list
/// of byte ranges, validated against `file_size`. Returns inclusive
/// `(start, end)` pairs, or `None` when the list is malformed or any range
/// falls outside the resource (the caller replies 416).
///
/// Supported forms: `start-end`, `start-` (to end of file) and `-suffix`
/// (last `suffix` bytes). Ends past the file are clamped to the final byte.
pub fn parse_ranges(spec: &str, file_size: u64) -> Option<Vec<(u64, u64)>> {
    if file_size == 0 {
        return None;
    }

    let mut ranges = Vec::new();

    for part in spec.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        let range = if let Some(suffix) = part.strip_prefix('-') {
            let suffix: u64 = suffix.trim().parse().ok()?;
            if suffix == 0 {
                return None;
            }
            (file_size.saturating_sub(suffix), file_size - 1)
        } else if let Some(start) = part.strip_suffix('-') {
            let start: u64 = start.trim().parse().ok()?;
            if start >= file_size {
                return None;
            }
            (start, file_size - 1)
        } else {
            let (start, end) = part.split_once('-')?;
            let start: u64 = start.trim().parse().ok()?;
            let end: u64 = end.trim().parse().ok()?;
            if start > end || start >= file_size {
                return None;
            }
            (start, end.min(file_size - 1))
        };

        ranges.push(range);
    }

    if ranges.is_empty() {
        return None;
    }

    Some(ranges)
}
