//! HTTP `Range` header parsing and resolution against an object size
//!
//! Only the single-range `bytes=<start>-<end>` form is understood. Parsing
//! happens before the object size is known; [`RangeRequest::resolve`]
//! validates the bounds once the store has reported the size.

use crate::models::ByteRange;
use tracing::debug;

/// A client range request, before it has been checked against the object size
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RangeRequest {
    /// No usable `Range` header; serve the whole object
    #[default]
    None,
    /// `bytes=start-` or `bytes=start-end`
    Bytes { start: u64, end: Option<u64> },
    /// A range that can never be satisfied, whatever the size (e.g. `bytes=-500`)
    Unsatisfiable,
}

/// Outcome of resolving a [`RangeRequest`] against a known (or unknown) size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeDecision {
    /// Serve the full object
    Full,
    /// Serve the given interval with 206
    Partial(ByteRange),
    /// Reply 416
    Unsatisfiable,
}

impl RangeDecision {
    pub fn is_partial(&self) -> bool {
        matches!(self, RangeDecision::Partial(_))
    }
}

impl RangeRequest {
    /// Parse a raw `Range` header value
    ///
    /// Multiple ranges, other units and malformed numbers fall back to
    /// [`RangeRequest::None`] so the client receives the full object.
    pub fn parse(header: Option<&str>) -> Self {
        let Some(header) = header else {
            return RangeRequest::None;
        };

        let Some(ranges) = header.trim().strip_prefix("bytes=") else {
            debug!("Ignoring Range header with unsupported unit: {}", header);
            return RangeRequest::None;
        };

        if ranges.contains(',') {
            debug!("Ignoring multi-range header: {}", header);
            return RangeRequest::None;
        }

        let Some((start_str, end_str)) = ranges.split_once('-') else {
            return RangeRequest::None;
        };
        let (start_str, end_str) = (start_str.trim(), end_str.trim());

        if start_str.is_empty() {
            // Suffix ranges ("last N bytes") are not served.
            return if end_str.parse::<u64>().is_ok() {
                RangeRequest::Unsatisfiable
            } else {
                RangeRequest::None
            };
        }

        let Ok(start) = start_str.parse::<u64>() else {
            return RangeRequest::None;
        };

        if end_str.is_empty() {
            return RangeRequest::Bytes { start, end: None };
        }

        match end_str.parse::<u64>() {
            Ok(end) => RangeRequest::Bytes {
                start,
                end: Some(end),
            },
            Err(_) => RangeRequest::None,
        }
    }

    /// Whether the client asked for a range at all
    pub fn is_requested(&self) -> bool {
        !matches!(self, RangeRequest::None)
    }

    /// Validate against the object size
    ///
    /// - `end` missing or past the last byte is clamped to `size - 1`
    /// - `start >= size` or `start > end` is unsatisfiable
    /// - an unknown size degrades to the full object
    pub fn resolve(&self, size: Option<u64>) -> RangeDecision {
        match *self {
            RangeRequest::None => RangeDecision::Full,
            RangeRequest::Unsatisfiable => RangeDecision::Unsatisfiable,
            RangeRequest::Bytes { start, end } => {
                let Some(size) = size else {
                    debug!("Object size unknown, ignoring range starting at {}", start);
                    return RangeDecision::Full;
                };

                if size == 0 || start >= size {
                    return RangeDecision::Unsatisfiable;
                }

                let last = size - 1;
                let end = end.map_or(last, |e| e.min(last));
                match ByteRange::new(start, end) {
                    Ok(range) => RangeDecision::Partial(range),
                    Err(_) => RangeDecision::Unsatisfiable,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partial(start: u64, end: u64) -> RangeDecision {
        RangeDecision::Partial(ByteRange::new(start, end).unwrap())
    }

    #[test]
    fn test_parse_absent() {
        assert_eq!(RangeRequest::parse(None), RangeRequest::None);
    }

    #[test]
    fn test_parse_closed_and_open() {
        assert_eq!(
            RangeRequest::parse(Some("bytes=0-99")),
            RangeRequest::Bytes { start: 0, end: Some(99) }
        );
        assert_eq!(
            RangeRequest::parse(Some("bytes=500-")),
            RangeRequest::Bytes { start: 500, end: None }
        );
        assert_eq!(
            RangeRequest::parse(Some(" bytes= 1 - 2 ")),
            RangeRequest::Bytes { start: 1, end: Some(2) }
        );
    }

    #[test]
    fn test_parse_missing_start_is_unsatisfiable() {
        assert_eq!(RangeRequest::parse(Some("bytes=-500")), RangeRequest::Unsatisfiable);
    }

    #[test]
    fn test_parse_fallbacks() {
        assert_eq!(RangeRequest::parse(Some("bytes=0-1,5-9")), RangeRequest::None);
        assert_eq!(RangeRequest::parse(Some("items=0-1")), RangeRequest::None);
        assert_eq!(RangeRequest::parse(Some("bytes=abc-1")), RangeRequest::None);
        assert_eq!(RangeRequest::parse(Some("bytes=0-x")), RangeRequest::None);
        assert_eq!(RangeRequest::parse(Some("bytes=5")), RangeRequest::None);
        assert_eq!(RangeRequest::parse(Some("bytes=-")), RangeRequest::None);
    }

    #[test]
    fn test_resolve_simple() {
        let req = RangeRequest::parse(Some("bytes=0-99"));
        assert_eq!(req.resolve(Some(1000)), partial(0, 99));
    }

    #[test]
    fn test_resolve_clamps_end() {
        let req = RangeRequest::parse(Some("bytes=900-2000"));
        assert_eq!(req.resolve(Some(1000)), partial(900, 999));

        let open = RangeRequest::parse(Some("bytes=10-"));
        assert_eq!(open.resolve(Some(1000)), partial(10, 999));
    }

    #[test]
    fn test_resolve_unsatisfiable() {
        assert_eq!(
            RangeRequest::parse(Some("bytes=1000-")).resolve(Some(1000)),
            RangeDecision::Unsatisfiable
        );
        assert_eq!(
            RangeRequest::parse(Some("bytes=50-10")).resolve(Some(1000)),
            RangeDecision::Unsatisfiable
        );
        assert_eq!(
            RangeRequest::parse(Some("bytes=0-0")).resolve(Some(0)),
            RangeDecision::Unsatisfiable
        );
        assert_eq!(
            RangeRequest::Unsatisfiable.resolve(Some(1000)),
            RangeDecision::Unsatisfiable
        );
    }

    #[test]
    fn test_resolve_unknown_size_degrades_to_full() {
        let req = RangeRequest::parse(Some("bytes=0-99"));
        assert_eq!(req.resolve(None), RangeDecision::Full);
    }

    #[test]
    fn test_resolve_no_range() {
        assert_eq!(RangeRequest::None.resolve(Some(10)), RangeDecision::Full);
        assert!(!RangeRequest::None.is_requested());
    }
}
