//! `Range: bytes=...` parsing

/// Inclusive byte range within a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: usize,
    pub end: usize,
}

#[allow(clippy::len_without_is_empty)]
impl ByteRange {
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RangeError {
    #[error("Malformed range header: {0:?}")]
    Malformed(String),

    #[error("Range {header:?} not satisfiable for {len} bytes")]
    Unsatisfiable { header: String, len: usize },
}

/// Parse a single-range header against a payload of `len` bytes.
///
/// Accepts `bytes=a-b`, `bytes=a-` and the suffix form `bytes=-n`. An end
/// past the payload is clamped. Multiple ranges are not supported.
pub fn parse_range(header: &str, len: usize) -> Result<ByteRange, RangeError> {
    let malformed = || RangeError::Malformed(header.to_string());
    let unsatisfiable = || RangeError::Unsatisfiable {
        header: header.to_string(),
        len,
    };

    let spec = header
        .trim()
        .strip_prefix("bytes=")
        .ok_or_else(malformed)?
        .trim();
    if spec.contains(',') {
        return Err(malformed());
    }
    let (start, end) = spec.split_once('-').ok_or_else(malformed)?;
    let (start, end) = (start.trim(), end.trim());

    let parse = |s: &str| s.parse::<usize>().map_err(|_| malformed());

    if start.is_empty() {
        let suffix = parse(end)?;
        if suffix == 0 || len == 0 {
            return Err(unsatisfiable());
        }
        return Ok(ByteRange {
            start: len.saturating_sub(suffix),
            end: len - 1,
        });
    }

    let start = parse(start)?;
    let end = if end.is_empty() { usize::MAX } else { parse(end)? };
    if end < start {
        return Err(malformed());
    }
    if start >= len {
        return Err(unsatisfiable());
    }
    Ok(ByteRange {
        start,
        end: end.min(len - 1),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_range() {
        let range = parse_range("bytes=100-199", 1000).unwrap();
        assert_eq!(range, ByteRange { start: 100, end: 199 });
        assert_eq!(range.len(), 100);
    }

    #[test]
    fn test_open_and_suffix_ranges() {
        assert_eq!(parse_range("bytes=900-", 1000).unwrap(), ByteRange { start: 900, end: 999 });
        assert_eq!(parse_range("bytes=-10", 1000).unwrap(), ByteRange { start: 990, end: 999 });
        assert_eq!(parse_range("bytes=-5000", 1000).unwrap(), ByteRange { start: 0, end: 999 });
    }

    #[test]
    fn test_end_clamped() {
        assert_eq!(parse_range("bytes=0-4999", 1000).unwrap().end, 999);
    }

    #[test]
    fn test_malformed() {
        for header in ["items=0-1", "bytes=a-b", "bytes=5", "bytes=10-5", "bytes=0-1,5-6"] {
            assert!(
                matches!(parse_range(header, 1000), Err(RangeError::Malformed(_))),
                "{header} should be malformed"
            );
        }
    }

    #[test]
    fn test_unsatisfiable() {
        assert!(matches!(
            parse_range("bytes=1000-1001", 1000),
            Err(RangeError::Unsatisfiable { .. })
        ));
        assert!(matches!(
            parse_range("bytes=0-", 0),
            Err(RangeError::Unsatisfiable { .. })
        ));
        assert!(matches!(
            parse_range("bytes=-0", 1000),
            Err(RangeError::Unsatisfiable { .. })
        ));
    }
}
