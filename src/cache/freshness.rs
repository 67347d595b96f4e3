//! Freshness derivation: ETag, Age, Expires, Last-Modified.
//!
//! Nothing here is persisted. Validators are recomputed from the raw
//! payload and the decoded rows every time an entry is served, so the
//! cache store only ever holds opaque bytes plus a TTL.

use serde_json::Value;
use sha2::{Digest, Sha256};
use time::format_description::BorrowedFormatItem;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Duration, OffsetDateTime};

/// IMF-fixdate, the HTTP date format.
const HTTP_DATE: &[BorrowedFormatItem<'static>] = format_description!(
    "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
);

/// Quoted hex digest of the payload bytes.
pub fn compute_etag(payload: &[u8]) -> String {
    let digest = Sha256::digest(payload);
    format!("\"{}\"", hex::encode(digest))
}

/// Format a timestamp as an HTTP date header value.
pub fn http_date(timestamp: OffsetDateTime) -> String {
    timestamp
        .to_offset(time::UtcOffset::UTC)
        .format(HTTP_DATE)
        .unwrap_or_default()
}

/// Most recent `updatedAt` across the rows; the zero value (Unix epoch)
/// when no row carries one.
pub fn last_modified(rows: &[Value]) -> OffsetDateTime {
    rows.iter()
        .filter_map(|row| row.get("updatedAt"))
        .filter_map(Value::as_str)
        .filter_map(|raw| OffsetDateTime::parse(raw, &Rfc3339).ok())
        .max()
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

/// The freshness header set emitted with cached (and freshly cached)
/// responses.
#[derive(Debug, Clone)]
pub struct Freshness {
    /// Seconds the entry has spent in the cache: max-age − remaining TTL.
    pub age: i64,
    pub max_age: u64,
    pub etag: String,
    pub expires: OffsetDateTime,
    pub last_modified: OffsetDateTime,
}

impl Freshness {
    /// Freshness for an entry read back from the cache store.
    pub fn for_cached(payload: &[u8], rows: &[Value], max_age: u64, remaining_ttl: Duration) -> Self {
        Self {
            age: max_age as i64 - remaining_ttl.whole_seconds(),
            max_age,
            etag: compute_etag(payload),
            expires: OffsetDateTime::now_utc() + Duration::seconds(max_age as i64),
            last_modified: last_modified(rows),
        }
    }

    /// Freshness for a payload just produced by an origin query.
    pub fn for_fresh(payload: &[u8], rows: &[Value], max_age: u64) -> Self {
        Self::for_cached(payload, rows, max_age, Duration::seconds(max_age as i64))
    }

    pub fn expires_header(&self) -> String {
        http_date(self.expires)
    }

    pub fn last_modified_header(&self) -> String {
        http_date(self.last_modified)
    }

    pub fn cache_control_header(&self) -> String {
        format!("public, max-age={}", self.max_age)
    }
}
