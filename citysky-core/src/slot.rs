//! Forecast slot selection: pick the hourly sample closest to, but not before, "now".

use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, Utc};

/// Index of the earliest timestamp at or after `reference`, treating naive
/// timestamps as UTC. See [`select_slot_with_offset`].
pub fn select_slot<S: AsRef<str>>(timestamps: &[S], reference: DateTime<Utc>) -> usize {
    select_slot_with_offset(timestamps, reference, Utc.fix())
}

/// Index of the earliest timestamp at or after `reference`.
///
/// Naive timestamps (`2024-05-01T13:00`) are read in `offset`, the forecast
/// location's UTC offset. Unparseable entries are skipped. If nothing qualifies
/// (empty or fully past series) the result is 0.
pub fn select_slot_with_offset<S: AsRef<str>>(
    timestamps: &[S],
    reference: DateTime<Utc>,
    offset: FixedOffset,
) -> usize {
    let mut best: Option<(usize, chrono::Duration)> = None;

    for (idx, raw) in timestamps.iter().enumerate() {
        let Some(at) = parse_timestamp(raw.as_ref(), offset) else {
            continue;
        };
        let delta = at - reference;
        if delta < chrono::Duration::zero() {
            continue;
        }
        if best.is_none_or(|(_, d)| delta < d) {
            best = Some((idx, delta));
        }
    }

    best.map(|(idx, _)| idx).unwrap_or(0)
}

/// Parse an RFC 3339 timestamp, or a naive one in `offset`.
pub fn parse_timestamp(raw: &str, offset: FixedOffset) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .ok()?;

    naive.and_local_timezone(offset).single().map(|dt| dt.with_timezone(&Utc))
}

/// Wall-clock `HH:MM` at a location `utc_offset_seconds` away from UTC.
pub fn local_time_label(reference: DateTime<Utc>, utc_offset_seconds: i32) -> String {
    let offset = FixedOffset::east_opt(utc_offset_seconds).unwrap_or_else(|| Utc.fix());
    reference.with_timezone(&offset).format("%H:%M").to_string()
}
