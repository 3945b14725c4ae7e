//! Stateless date and number formatting helpers shared by the renderer and page

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};

use crate::data::{MetricKind, TimeRange, UNKNOWN_DATE};

/// Parse a record timestamp
///
/// Accepts RFC 3339, naive date-times (taken as UTC) and bare dates (midnight
/// UTC). The `Unknown date` sentinel and anything unparseable yield `None`.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case(UNKNOWN_DATE) || raw.eq_ignore_ascii_case("unknown")
    {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt);
    }

    let utc = FixedOffset::east_opt(0)?;
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc().with_timezone(&utc));
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc().with_timezone(&utc))
}

/// Format an IOPS value: `1.2M`, `3.4k` or a plain integer
pub fn format_iops(value: f64) -> String {
    // Switch units where the smaller one would round up to 1000
    let abs = value.abs();
    if abs >= 999_950.0 {
        format!("{:.1}M", value / 1_000_000.0)
    } else if abs >= 999.5 {
        format!("{:.1}k", value / 1_000.0)
    } else {
        format!("{:.0}", value)
    }
}

/// Format a latency in milliseconds, keeping sub-millisecond precision
pub fn format_latency(value: f64) -> String {
    if value.abs() >= 1.0 {
        format!("{:.1}", value)
    } else {
        format!("{:.3}", value)
    }
}

pub fn format_value(kind: MetricKind, value: f64) -> String {
    match kind {
        MetricKind::Iops => format_iops(value),
        MetricKind::Latency => format_latency(value),
    }
}

/// Tooltip value with its unit
pub fn format_value_with_unit(kind: MetricKind, value: f64) -> String {
    match kind {
        MetricKind::Iops => format!("{} IOPS", format_iops(value)),
        MetricKind::Latency => format!("{} ms", format_latency(value)),
    }
}

/// Number of x-axis ticks for a time range
pub fn x_tick_count(range: TimeRange) -> usize {
    if range.is_short() {
        8
    } else {
        6
    }
}

/// strftime pattern for x-axis tick labels
pub fn x_tick_format(range: TimeRange) -> &'static str {
    match range {
        TimeRange::Days(d) if d <= 1 => "%H:%M",
        r if r.is_short() => "%m/%d %H:%M",
        _ => "%b %d",
    }
}

pub fn format_tick_time(dt: &DateTime<FixedOffset>, range: TimeRange) -> String {
    dt.format(x_tick_format(range)).to_string()
}

pub fn format_tooltip_time(dt: &DateTime<FixedOffset>) -> String {
    dt.format("%Y-%m-%d %H:%M").to_string()
}

pub fn format_generated_time(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp_variants() {
        assert!(parse_timestamp("2024-01-01T12:00:00Z").is_some());
        assert!(parse_timestamp("2024-01-01T12:00:00+02:00").is_some());
        assert!(parse_timestamp("2024-01-01T12:00:00").is_some());
        assert!(parse_timestamp("2024-01-01 12:00:00").is_some());
        assert!(parse_timestamp("2024-01-01").is_some());

        assert!(parse_timestamp("Unknown date").is_none());
        assert!(parse_timestamp("unknown").is_none());
        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_parse_timestamp_keeps_offset() {
        let dt = parse_timestamp("2024-01-01T23:30:00-05:00").unwrap();
        assert_eq!(dt.date_naive().to_string(), "2024-01-01");
    }

    #[test]
    fn test_format_iops() {
        assert_eq!(format_iops(2_500_000.0), "2.5M");
        assert_eq!(format_iops(1_000_000.0), "1.0M");
        assert_eq!(format_iops(12_300.0), "12.3k");
        assert_eq!(format_iops(1_000.0), "1.0k");
        assert_eq!(format_iops(999.0), "999");
        assert_eq!(format_iops(0.0), "0");
    }

    #[test]
    fn test_format_iops_unit_boundaries() {
        assert_eq!(format_iops(999.4), "999");
        assert_eq!(format_iops(999.6), "1.0k");
        assert_eq!(format_iops(999_940.0), "999.9k");
        assert_eq!(format_iops(999_950.0), "1.0M");
        assert_eq!(format_iops(-999.6), "-1.0k");
    }

    #[test]
    fn test_format_latency() {
        assert_eq!(format_latency(12.345), "12.3");
        assert_eq!(format_latency(1.0), "1.0");
        assert_eq!(format_latency(0.1234), "0.123");
        assert_eq!(format_latency(0.0), "0.000");
    }

    #[test]
    fn test_tick_format_by_range() {
        assert_eq!(x_tick_format(TimeRange::Days(1)), "%H:%M");
        assert_eq!(x_tick_format(TimeRange::Days(7)), "%m/%d %H:%M");
        assert_eq!(x_tick_format(TimeRange::Days(30)), "%b %d");
        assert_eq!(x_tick_format(TimeRange::All), "%b %d");
        assert!(x_tick_count(TimeRange::Days(7)) > x_tick_count(TimeRange::Days(30)));
    }
}
