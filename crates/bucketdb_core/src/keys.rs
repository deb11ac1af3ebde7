//! Storage key derivation.
//!
//! Every physical document of an entity lives under the entity's core key, so
//! a single prefix scan reassembles the entity:
//!
//! ```text
//! post/1700000000000-00001/              core record
//! post/1700000000000-00001/address       bucket "address"
//! post/1700000000000-00001/sk/tag/rust   index entry (tag = rust)
//! post/tag/rust/1700000000000-00001      index marker
//! ```
//!
//! Index markers live in the collection's index namespace so a prefix scan
//! over `post/tag/rust/` enumerates every entity indexed under that value.

use crate::error::{CoreError, CoreResult};

/// Separator between key segments.
pub const SEPARATOR: char = '/';

/// Segment that marks index entries under a core key.
pub const INDEX_ENTRY_MARKER: &str = "sk/";

/// Greatest char; appended to a prefix to bound a prefix scan.
///
/// Keys compare byte-wise, and U+10FFFF encodes above every other char.
pub const SCAN_SENTINEL: char = '\u{10FFFF}';

/// Returns `prefix/id/`.
#[must_use]
pub fn core_key(prefix: &str, id: &str) -> String {
    format!("{prefix}/{id}/")
}

/// Returns the key of bucket `bucket_name` under `core_key`.
#[must_use]
pub fn bucket_key(core_key: &str, bucket_name: &str) -> String {
    format!("{core_key}{bucket_name}")
}

/// Returns the key of the index entry for `(index_name, value)` under `core_key`.
#[must_use]
pub fn index_entry_key(core_key: &str, index_name: &str, value: &str) -> String {
    format!("{core_key}{INDEX_ENTRY_MARKER}{index_name}/{value}")
}

/// Returns the key of the index marker for `(index_name, value)` of entity `id`.
#[must_use]
pub fn index_marker_key(prefix: &str, index_name: &str, value: &str, id: &str) -> String {
    format!("{prefix}/{index_name}/{value}/{id}")
}

/// Returns the identity of an index entry within one entity, `name/value`.
#[must_use]
pub fn index_slot(index_name: &str, value: &str) -> String {
    format!("{index_name}/{value}")
}

/// Returns the start key of an index lookup.
///
/// Exact lookups end with a separator so `rust` doesn't match `rustacean`;
/// `starts_with` lookups leave it off.
#[must_use]
pub fn index_search_prefix(prefix: &str, index_name: &str, value: &str, starts_with: bool) -> String {
    if starts_with {
        format!("{prefix}/{index_name}/{value}")
    } else {
        format!("{prefix}/{index_name}/{value}/")
    }
}

/// Returns `prefix/index_name/`, the namespace holding every marker of one index.
#[must_use]
pub fn index_namespace(prefix: &str, index_name: &str) -> String {
    format!("{prefix}/{index_name}/")
}

/// Returns the inclusive upper bound of a scan over keys starting with `start`.
#[must_use]
pub fn scan_upper_bound(start: &str) -> String {
    let mut end = String::with_capacity(start.len() + SCAN_SENTINEL.len_utf8());
    end.push_str(start);
    end.push(SCAN_SENTINEL);
    end
}

/// Returns the entity id at the end of an index marker key.
#[must_use]
pub fn entity_id_from_marker(marker_key: &str) -> Option<&str> {
    marker_key
        .rsplit_once(SEPARATOR)
        .map(|(_, id)| id)
        .filter(|id| !id.is_empty())
}

/// Returns the `(value, id)` pair of a marker key in the `index_name` namespace.
#[must_use]
pub fn split_marker<'a>(prefix: &str, index_name: &str, marker_key: &'a str) -> Option<(&'a str, &'a str)> {
    let namespace = index_namespace(prefix, index_name);
    let rest = marker_key.strip_prefix(namespace.as_str())?;
    let (value, id) = rest.rsplit_once(SEPARATOR)?;
    (!id.is_empty()).then_some((value, id))
}

/// What a key returned by an entity scan refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    /// The core record.
    Core,
    /// An index entry.
    IndexEntry,
    /// A bucket.
    Bucket,
}

impl KeyKind {
    /// Classifies `key`, which must start with `core_key`.
    #[must_use]
    pub fn classify(core_key: &str, key: &str) -> Self {
        match key.strip_prefix(core_key) {
            Some("") => KeyKind::Core,
            Some(rest) if rest.starts_with(INDEX_ENTRY_MARKER) => KeyKind::IndexEntry,
            _ => KeyKind::Bucket,
        }
    }
}

/// Rejects empty segments and segments containing the separator.
///
/// # Errors
///
/// Returns `Validation` naming `what` when `segment` is unusable.
pub fn validate_segment(what: &str, segment: &str) -> CoreResult<()> {
    if segment.is_empty() {
        return Err(CoreError::validation(format!("{what} must not be empty")));
    }
    if segment.contains(SEPARATOR) {
        return Err(CoreError::validation(format!(
            "{what} must not contain '{SEPARATOR}': {segment}"
        )));
    }
    Ok(())
}
