//! Duration expressions and the optional end-of-session timer.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use thiserror::Error;
use tokio::time::Instant;

const NANOS_PER_MICRO: u128 = 1_000;
const NANOS_PER_MILLI: u128 = 1_000_000;
const NANOS_PER_SECOND: u128 = 1_000_000_000;

/// Errors from parsing a duration expression such as `1h30m`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DurationError {
    #[error("duration expression is empty")]
    Empty,
    #[error("invalid duration {expr:?} (use a format like 2h, 30m, 1h30m)")]
    Invalid { expr: String },
    #[error("unknown unit {unit:?} in duration {expr:?} (valid units: ns, us, ms, s, m, h)")]
    UnknownUnit { expr: String, unit: String },
    #[error("duration {expr:?} must be greater than zero")]
    NotPositive { expr: String },
    #[error("duration {expr:?} is too large")]
    TooLarge { expr: String },
}

/// Parses a sequence of `<number><unit>` terms, e.g. `2h`, `1h30m`, `1.5h`, `90s`.
pub fn parse_duration(expr: &str) -> Result<Duration, DurationError> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Err(DurationError::Empty);
    }
    let invalid = || DurationError::Invalid {
        expr: expr.to_string(),
    };
    let too_large = || DurationError::TooLarge {
        expr: expr.to_string(),
    };

    let mut rest = expr;
    let mut total: u128 = 0;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, after_number) = rest.split_at(number_len);
        if number.is_empty() || number == "." || number.matches('.').count() > 1 {
            return Err(invalid());
        }

        let unit_len = after_number
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(after_number.len());
        let (unit, after_unit) = after_number.split_at(unit_len);
        if unit.is_empty() {
            return Err(invalid());
        }
        let nanos_per_unit = unit_nanos(unit).ok_or_else(|| DurationError::UnknownUnit {
            expr: expr.to_string(),
            unit: unit.to_string(),
        })?;

        let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| too_large())?
        };
        let mut term = whole.checked_mul(nanos_per_unit).ok_or_else(too_large)?;
        let mut scale = nanos_per_unit;
        for digit in fraction.chars().filter_map(|c| c.to_digit(10)) {
            scale /= 10;
            term = term
                .checked_add(u128::from(digit) * scale)
                .ok_or_else(too_large)?;
        }

        total = total.checked_add(term).ok_or_else(too_large)?;
        rest = after_unit;
    }

    if total == 0 {
        return Err(DurationError::NotPositive {
            expr: expr.to_string(),
        });
    }
    let nanos = u64::try_from(total).map_err(|_| too_large())?;
    Ok(Duration::from_nanos(nanos))
}

fn unit_nanos(unit: &str) -> Option<u128> {
    match unit {
        "ns" => Some(1),
        "us" | "µs" | "μs" => Some(NANOS_PER_MICRO),
        "ms" => Some(NANOS_PER_MILLI),
        "s" => Some(NANOS_PER_SECOND),
        "m" => Some(60 * NANOS_PER_SECOND),
        "h" => Some(60 * 60 * NANOS_PER_SECOND),
        _ => None,
    }
}

/// A one-shot deadline after which the session should end.
#[derive(Debug, Clone, Copy)]
pub struct EndTimer {
    duration: Duration,
    deadline: Instant,
    ends_at: DateTime<Utc>,
}

impl EndTimer {
    /// Builds a timer from a user-supplied expression.
    ///
    /// An empty expression means "no timer" and yields `Ok(None)`.
    pub fn from_expr(expr: &str) -> Result<Option<Self>, DurationError> {
        if expr.trim().is_empty() {
            return Ok(None);
        }
        parse_duration(expr).and_then(Self::after).map(Some)
    }

    /// Starts a timer that fires `duration` from now.
    pub fn after(duration: Duration) -> Result<Self, DurationError> {
        let too_large = || DurationError::TooLarge {
            expr: format!("{duration:?}"),
        };

        let deadline = Instant::now().checked_add(duration).ok_or_else(too_large)?;
        let ends_at = TimeDelta::from_std(duration)
            .ok()
            .and_then(|delta| Utc::now().checked_add_signed(delta))
            .ok_or_else(too_large)?;

        Ok(Self {
            duration,
            deadline,
            ends_at,
        })
    }

    pub const fn duration(&self) -> Duration {
        self.duration
    }

    pub const fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Wall-clock instant the timer is expected to fire.
    pub const fn ends_at(&self) -> DateTime<Utc> {
        self.ends_at
    }

    /// Resolves once the deadline has passed.
    pub async fn wait(&self) {
        tokio::time::sleep_until(self.deadline).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_units() {
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("30m").unwrap(), Duration::from_secs(1800));
        assert_eq!(parse_duration("90s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("15us").unwrap(), Duration::from_micros(15));
        assert_eq!(parse_duration("15µs").unwrap(), Duration::from_micros(15));
        assert_eq!(parse_duration("7ns").unwrap(), Duration::from_nanos(7));
    }

    #[test]
    fn parses_compound_and_fractional_terms() {
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("1.5h").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration(".5s").unwrap(), Duration::from_millis(500));
        assert_eq!(
            parse_duration("1h2m3s").unwrap(),
            Duration::from_secs(3600 + 120 + 3)
        );
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        assert_eq!(parse_duration("  45m ").unwrap(), Duration::from_secs(2700));
    }

    #[test]
    fn rejects_malformed_expressions() {
        for expr in ["2", "h", "abc", "1..5h", "-2h", "."] {
            assert!(
                matches!(parse_duration(expr), Err(DurationError::Invalid { .. })),
                "expected {expr:?} to be invalid"
            );
        }
        assert!(parse_duration("2h 30m").is_err());
    }

    #[test]
    fn rejects_unknown_units() {
        let err = parse_duration("3d").unwrap_err();
        assert_eq!(
            err,
            DurationError::UnknownUnit {
                expr: "3d".to_string(),
                unit: "d".to_string(),
            }
        );
    }

    #[test]
    fn rejects_zero() {
        assert!(matches!(
            parse_duration("0s"),
            Err(DurationError::NotPositive { .. })
        ));
    }

    #[test]
    fn rejects_overflow() {
        assert!(matches!(
            parse_duration("99999999999999999999h"),
            Err(DurationError::TooLarge { .. })
        ));
        assert!(matches!(
            parse_duration("94522879700260684295381835.9h"),
            Err(DurationError::TooLarge { .. })
        ));
    }

    #[test]
    fn invalid_error_suggests_format() {
        let message = parse_duration("soon").unwrap_err().to_string();
        assert!(message.contains("1h30m"), "{message}");
    }

    #[test]
    fn empty_expression_means_no_timer() {
        assert!(EndTimer::from_expr("").unwrap().is_none());
        assert!(EndTimer::from_expr("   ").unwrap().is_none());
    }

    #[test]
    fn malformed_expression_is_an_error() {
        assert!(EndTimer::from_expr("two hours").is_err());
    }

    #[tokio::test]
    async fn ends_at_matches_duration() {
        let before = Utc::now();
        let timer = EndTimer::from_expr("10m").unwrap().unwrap();
        assert_eq!(timer.duration(), Duration::from_secs(600));
        assert!(timer.ends_at() >= before + TimeDelta::minutes(10));
        assert!(timer.deadline() > Instant::now());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_resolves_at_deadline() {
        let started = Instant::now();
        let timer = EndTimer::from_expr("2s").unwrap().unwrap();
        timer.wait().await;
        assert!(started.elapsed() >= Duration::from_secs(2));
    }
}
