//! Local-time bucket keys

use chrono::{DateTime, Datelike, Local, NaiveDateTime, TimeDelta, TimeZone, Utc};

/// Hour bucket format, e.g. `2024-03-05 14:00`
pub const HOUR_KEY_FORMAT: &str = "%Y-%m-%d %H:00";

/// Day bucket format, e.g. `2024-03-05`
pub const DAY_KEY_FORMAT: &str = "%Y-%m-%d";

pub fn local_time(ts_ms: i64) -> DateTime<Local> {
    DateTime::<Utc>::from_timestamp_millis(ts_ms)
        .unwrap_or_default()
        .with_timezone(&Local)
}

pub fn hour_key(ts_ms: i64) -> String {
    local_time(ts_ms).format(HOUR_KEY_FORMAT).to_string()
}

pub fn day_key(ts_ms: i64) -> String {
    local_time(ts_ms).format(DAY_KEY_FORMAT).to_string()
}

/// First instant of the local calendar month containing `ts_ms`
pub fn month_start(ts_ms: i64) -> i64 {
    let Some(first) = local_time(ts_ms)
        .date_naive()
        .with_day(1)
        .and_then(|day| day.and_hms_opt(0, 0, 0))
    else {
        return ts_ms;
    };

    first_valid_instant(first, |dt| {
        Local
            .from_local_datetime(dt)
            .earliest()
            .map(|dt| dt.timestamp_millis())
    })
    .unwrap_or(ts_ms)
}

/// Resolve `start`, stepping forward an hour at a time past a DST gap
fn first_valid_instant(
    start: NaiveDateTime,
    resolve: impl Fn(&NaiveDateTime) -> Option<i64>,
) -> Option<i64> {
    (0..=24)
        .filter_map(|hours| start.checked_add_signed(TimeDelta::hours(hours)))
        .find_map(|dt| resolve(&dt))
}
