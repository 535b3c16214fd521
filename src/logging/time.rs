use chrono::{DateTime, SecondsFormat, Utc};

/// Timestamps stored in the document use the same shape as a browser's
/// `Date.toISOString()`: UTC, millisecond precision, `Z` suffix.
pub fn to_iso8601_millis(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn now_iso8601() -> String {
    to_iso8601_millis(&Utc::now())
}

// Log timestamps use the same format as the stored records.
pub struct IsoTimer;

impl tracing_subscriber::fmt::time::FormatTime for IsoTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", now_iso8601())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn formats_like_browser_iso_strings() {
        let dt = Utc.with_ymd_and_hms(2026, 1, 20, 10, 20, 30).unwrap();
        assert_eq!(to_iso8601_millis(&dt), "2026-01-20T10:20:30.000Z");
    }

    #[test]
    fn now_parses_back_as_rfc3339() {
        let s = now_iso8601();
        assert!(DateTime::parse_from_rfc3339(&s).is_ok());
        assert!(s.ends_with('Z'));
    }
}
