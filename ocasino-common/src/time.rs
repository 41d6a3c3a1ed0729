use chrono::{DateTime, Utc};

/// Returns the current UNIX timestamp in seconds.
///
/// Used throughout the platform to stamp transactions, cache TTLs, and AML
/// windows.
///
/// # Panics
///
/// Panics if the system clock is set before the UNIX epoch.
pub fn current_time_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time is before UNIX epoch")
        .as_secs()
}

pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

/// Renders a timestamp the way every wallet/transaction response does: ISO-8601,
/// UTC, second precision.
pub fn to_iso8601(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_time_is_nonzero_and_monotonic() {
        let t1 = current_time_secs();
        let t2 = current_time_secs();
        assert!(t1 > 0);
        assert!(t2 >= t1);
    }

    #[test]
    fn iso8601_round_trips_through_chrono() {
        let ts = now_utc();
        let rendered = to_iso8601(ts);
        assert!(DateTime::parse_from_rfc3339(&rendered).is_ok());
    }
}
