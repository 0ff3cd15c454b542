use time::macros::format_description;
use time::{Date, Duration, OffsetDateTime, PrimitiveDateTime, UtcOffset};

pub fn now_in(offset: UtcOffset) -> OffsetDateTime {
    OffsetDateTime::now_utc().to_offset(offset)
}

pub fn epoch_ms(t: OffsetDateTime) -> i64 {
    (t.unix_timestamp_nanos() / 1_000_000) as i64
}

/// Parses `YYYY-MM-DD`, tolerating a trailing time part.
pub fn parse_ymd(s: &str) -> Option<Date> {
    let fmt = format_description!("[year]-[month]-[day]");
    let s = s.trim();
    Date::parse(s, &fmt)
        .ok()
        .or_else(|| s.get(..10).and_then(|head| Date::parse(head, &fmt).ok()))
}

pub fn format_ymd(d: Date) -> String {
    let fmt = format_description!("[year]-[month]-[day]");
    d.format(&fmt).unwrap_or_default()
}

/// `date` at the wall-clock time of `now`, in `now`'s offset.
pub fn on_date_at_time_of(date: Date, now: OffsetDateTime) -> OffsetDateTime {
    PrimitiveDateTime::new(date, now.time()).assume_offset(now.offset())
}

/// `[start, end)` of a local calendar day in epoch milliseconds.
pub fn day_bounds_ms(date: Date, offset: UtcOffset) -> (i64, i64) {
    let start = date.midnight().assume_offset(offset);
    (epoch_ms(start), epoch_ms(start + Duration::days(1)))
}
