//! Shared utilities for CLI commands.

use std::sync::LazyLock;

use anyhow::Context;
use chrono::{Duration, NaiveDate};
use est_core::Effort;
use regex::Regex;

/// `8`, `1.5`: a bare number of hours.
static BARE_HOURS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)(?:\.(\d{1,4}))?$").unwrap());

/// `8h`, `1.5h`, `90m`, `1h30m`, `2h 15m`.
static EFFORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(\d+)(?:\.(\d{1,4}))?h)?\s*(?:(\d+)m)?$").unwrap()
});

/// `+3d`, `-1d`: a date relative to today.
static RELATIVE_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([+-])(\d+)d$").unwrap());

/// Upper bound for relative dates.
const MAX_RELATIVE_DAYS: i64 = 100 * 365;

/// Minutes in `whole.fraction` hours, rounded down to the minute.
fn hours_to_minutes(whole: &str, fraction: Option<&str>) -> anyhow::Result<i64> {
    let whole: i64 = whole.parse().context("failed to parse hours")?;
    let mut minutes = whole.checked_mul(60).context("amount too large")?;
    if let Some(fraction) = fraction {
        let digits = u32::try_from(fraction.len()).context("fraction too long")?;
        let value: i64 = fraction.parse().context("failed to parse fraction")?;
        minutes += value * 60 / 10_i64.pow(digits);
    }
    Ok(minutes)
}

/// Parse an effort amount.
///
/// Supports:
/// - Bare hours: "8", "1.5"
/// - Hours and minutes: "8h", "1.5h", "90m", "1h30m", "2h 15m"
pub fn parse_effort(s: &str) -> anyhow::Result<Effort> {
    let s = s.trim();
    let minutes = if let Some(caps) = BARE_HOURS_RE.captures(s) {
        hours_to_minutes(&caps[1], caps.get(2).map(|m| m.as_str()))?
    } else {
        let caps = EFFORT_RE
            .captures(s)
            .filter(|caps| caps.get(1).is_some() || caps.get(3).is_some());
        let Some(caps) = caps else {
            anyhow::bail!("Invalid amount: {s}. Use hours (e.g., 8, 1.5h) or minutes (e.g., 90m, 1h30m)");
        };
        let hours = match caps.get(1) {
            Some(whole) => hours_to_minutes(whole.as_str(), caps.get(2).map(|m| m.as_str()))?,
            None => 0,
        };
        let extra: i64 = match caps.get(3) {
            Some(m) => m.as_str().parse().context("failed to parse minutes")?,
            None => 0,
        };
        hours.checked_add(extra).context("amount too large")?
    };

    if minutes > Effort::MAX.as_minutes() {
        anyhow::bail!("Amount too large: {s}");
    }
    Ok(Effort::new(minutes)?)
}

/// Parse a calendar date.
///
/// Supports:
/// - ISO 8601: "2026-01-15"
/// - Keywords: "today", "tomorrow", "yesterday"
/// - Relative: "+3d", "-1d"
pub fn parse_date(s: &str, today: NaiveDate) -> anyhow::Result<NaiveDate> {
    let s = s.trim();
    match s {
        "today" => return Ok(today),
        "tomorrow" => return Ok(today + Duration::days(1)),
        "yesterday" => return Ok(today - Duration::days(1)),
        _ => {}
    }

    if let Some(caps) = RELATIVE_DATE_RE.captures(s) {
        let n: i64 = caps[2]
            .parse()
            .context("failed to parse number in relative date")?;
        if n > MAX_RELATIVE_DAYS {
            anyhow::bail!("Relative date too far away: {s}");
        }
        let offset = Duration::days(n);
        return Ok(if &caps[1] == "+" {
            today + offset
        } else {
            today - offset
        });
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| {
        format!("Invalid date: {s}. Use YYYY-MM-DD, today, tomorrow, yesterday, +Nd or -Nd")
    })
}

/// First eight characters of an identifier.
pub fn short_id(id: &str) -> String {
    id.chars().take(8).collect()
}

/// Truncate by characters, not bytes, to avoid panics on multi-byte UTF-8.
pub fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() > width {
        format!("{}...", text.chars().take(width.saturating_sub(3)).collect::<String>())
    } else {
        text.to_string()
    }
}

/// Formats signed minutes as `+1h 30m`, `-45m` or `0h`.
pub fn format_signed(minutes: i64) -> String {
    let magnitude = Effort::new(minutes.abs()).unwrap_or_default();
    match minutes.signum() {
        1 => format!("+{magnitude}"),
        -1 => format!("-{magnitude}"),
        _ => magnitude.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_effort_bare_hours() {
        assert_eq!(parse_effort("8").unwrap(), Effort::from_hours(8));
        assert_eq!(parse_effort("1.5").unwrap(), Effort::from_mins(90));
        assert_eq!(parse_effort("0.25").unwrap(), Effort::from_mins(15));
    }

    #[test]
    fn test_parse_effort_units() {
        assert_eq!(parse_effort("8h").unwrap(), Effort::from_hours(8));
        assert_eq!(parse_effort("1.5h").unwrap(), Effort::from_mins(90));
        assert_eq!(parse_effort("90m").unwrap(), Effort::from_mins(90));
        assert_eq!(parse_effort("1h30m").unwrap(), Effort::from_mins(90));
        assert_eq!(parse_effort("2h 15m").unwrap(), Effort::from_mins(135));
        assert_eq!(parse_effort(" 0h ").unwrap(), Effort::ZERO);
    }

    #[test]
    fn test_parse_effort_invalid() {
        assert!(parse_effort("").is_err());
        assert!(parse_effort("h").is_err());
        assert!(parse_effort("-2h").is_err());
        assert!(parse_effort("two hours").is_err());
        assert!(parse_effort("99999999999h").is_err());
    }

    #[test]
    fn test_parse_date_keywords() {
        let today = date(2025, 1, 6);
        assert_eq!(parse_date("today", today).unwrap(), today);
        assert_eq!(parse_date("tomorrow", today).unwrap(), date(2025, 1, 7));
        assert_eq!(parse_date("yesterday", today).unwrap(), date(2025, 1, 5));
    }

    #[test]
    fn test_parse_date_relative_and_iso() {
        let today = date(2025, 1, 6);
        assert_eq!(parse_date("+7d", today).unwrap(), date(2025, 1, 13));
        assert_eq!(parse_date("-6d", today).unwrap(), date(2024, 12, 31));
        assert_eq!(parse_date("2025-02-28", today).unwrap(), date(2025, 2, 28));
    }

    #[test]
    fn test_parse_date_invalid() {
        let today = date(2025, 1, 6);
        assert!(parse_date("next week", today).is_err());
        assert!(parse_date("2025-02-30", today).is_err());
        assert!(parse_date("+99999d", today).is_err());
    }

    #[test]
    fn test_truncate_multibyte() {
        assert_eq!(truncate("Design doc", 22), "Design doc");
        assert_eq!(truncate("ÜberlangeAufgabenbeschreibung", 10), "Überlan...");
    }

    #[test]
    fn test_format_signed() {
        assert_eq!(format_signed(90), "+1h 30m");
        assert_eq!(format_signed(-45), "-45m");
        assert_eq!(format_signed(0), "0h");
    }
}
