//! Symbolic delay-duration lookup table (§4.1, §9). An unknown key falls
//! back to 1000ms rather than failing compilation.

const SECOND: i64 = 1_000;
const MINUTE: i64 = 60 * SECOND;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;
const WEEK: i64 = 7 * DAY;

const TABLE: &[(&str, i64)] = &[
    ("1_second", SECOND),
    ("30_seconds", 30 * SECOND),
    ("1_minute", MINUTE),
    ("2_minutes", 2 * MINUTE),
    ("5_minutes", 5 * MINUTE),
    ("10_minutes", 10 * MINUTE),
    ("30_minutes", 30 * MINUTE),
    ("1_hour", HOUR),
    ("2_hours", 2 * HOUR),
    ("6_hours", 6 * HOUR),
    ("12_hours", 12 * HOUR),
    ("1_day", DAY),
    ("2_days", 2 * DAY),
    ("3_days", 3 * DAY),
    ("5_days", 5 * DAY),
    ("1_week", WEEK),
    ("2_weeks", 2 * WEEK),
    ("1_month", 30 * DAY),
];

const FALLBACK_MS: i64 = 1_000;

pub fn delay_ms_for_key(key: &str) -> i64 {
    TABLE
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, ms)| *ms)
        .unwrap_or_else(|| {
            tracing::warn!(delay_key = key, fallback_ms = FALLBACK_MS, "unknown symbolic delay key, falling back");
            FALLBACK_MS
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_keys_resolve() {
        assert_eq!(delay_ms_for_key("1_hour"), 3_600_000);
        assert_eq!(delay_ms_for_key("1_day"), 86_400_000);
        assert_eq!(delay_ms_for_key("1_week"), 604_800_000);
    }

    #[test]
    fn unknown_key_falls_back_to_one_second() {
        assert_eq!(delay_ms_for_key("3_fortnights"), 1_000);
    }
}
