//! Snapshot naming
//!
//! Names are UTC timestamps with microsecond precision, so lexical order is
//! creation order. A device's next stamp is always strictly later than its
//! previous one, which keeps names unique under rapid repeated calls.

use chrono::{DateTime, Duration, Utc};

const ROLLBACK_SUFFIX: &str = "-rollback";

/// Creation time for a new snapshot, strictly after `previous`
pub fn next_stamp(previous: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = truncate_micros(Utc::now());
    match previous {
        Some(prev) => {
            let floor = truncate_micros(prev) + Duration::microseconds(1);
            now.max(floor)
        }
        None => now,
    }
}

fn truncate_micros(ts: DateTime<Utc>) -> DateTime<Utc> {
    let nanos = ts.timestamp_subsec_nanos();
    ts - Duration::nanoseconds(i64::from(nanos % 1_000))
}

/// Snapshot name for an upload created at `stamp`
pub fn upload_name(stamp: DateTime<Utc>) -> String {
    stamp.format("%Y%m%dT%H%M%S%.6fZ").to_string()
}

/// Snapshot name for a rollback created at `stamp`
pub fn rollback_name(stamp: DateTime<Utc>) -> String {
    format!("{}{}", upload_name(stamp), ROLLBACK_SUFFIX)
}
