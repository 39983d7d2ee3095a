//! Time helpers
//!
//! Date keys are UTC-normalized everywhere: the retention window and the
//! daily de-duplication guard both compare zero-padded `YYYY-MM-DD` tokens,
//! and mixing local-time keys across DST transitions would break the
//! lexicographic ordering those features rely on.

use chrono::{DateTime, Utc};

/// Zero-padded `YYYY-MM-DD` date key for the given instant, in UTC.
pub fn date_key(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}

/// Current instant as an RFC 3339 / ISO-8601 string.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// Whether two instants fall on the same UTC calendar date.
pub fn same_utc_day(a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
    a.date_naive() == b.date_naive()
}
