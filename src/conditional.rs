//! `If-None-Match` evaluation

/// Decide whether a request can be answered with 304 Not Modified.
///
/// Both values must be present and byte-for-byte equal. A request that also
/// carries a satisfiable range never gets a 304: ranged playback always
/// receives range semantics.
pub fn is_not_modified(
    if_none_match: Option<&str>,
    etag: Option<&str>,
    range_satisfiable: bool,
) -> bool {
    if range_satisfiable {
        return false;
    }

    match (if_none_match, etag) {
        (Some(client), Some(current)) => client == current,
        _ => false,
    }
}
