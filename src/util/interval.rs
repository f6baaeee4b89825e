use std::time::Duration;
use thiserror::Error;

/// Errors from [`parse_interval`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntervalError {
    #[error("empty interval")]
    Empty,
    #[error("invalid number in interval {0:?}")]
    InvalidNumber(String),
    #[error("unknown unit {unit:?} in interval {input:?} (use ns, us, ms, s, m or h)")]
    UnknownUnit { unit: String, input: String },
    #[error("missing unit in interval {0:?}")]
    MissingUnit(String),
    #[error("interval must be greater than zero")]
    Zero,
    #[error("interval {0:?} is too large")]
    Overflow(String),
}

const NANOS_PER_MICRO: u128 = 1_000;
const NANOS_PER_MILLI: u128 = 1_000_000;
const NANOS_PER_SEC: u128 = 1_000_000_000;

fn unit_nanos(unit: &str) -> Option<u128> {
    match unit {
        "ns" => Some(1),
        "us" | "µs" | "μs" => Some(NANOS_PER_MICRO),
        "ms" => Some(NANOS_PER_MILLI),
        "s" => Some(NANOS_PER_SEC),
        "m" => Some(60 * NANOS_PER_SEC),
        "h" => Some(3600 * NANOS_PER_SEC),
        _ => None,
    }
}

fn is_number_char(c: char) -> bool {
    c.is_ascii_digit() || c == '.'
}

/// Parse a polling interval such as `"30s"`, `"1m"`, `"1h30m"` or `"1.5s"`.
///
/// The input is a sequence of `<number><unit>` pairs; the number may carry a
/// decimal fraction. Signs are not accepted and the total must be positive.
pub fn parse_interval(input: &str) -> Result<Duration, IntervalError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(IntervalError::Empty);
    }

    let invalid = || IntervalError::InvalidNumber(s.to_string());
    let overflow = || IntervalError::Overflow(s.to_string());

    let mut rest = s;
    let mut total: u128 = 0;

    while !rest.is_empty() {
        let number_end = rest.find(|c| !is_number_char(c)).unwrap_or(rest.len());
        let number = &rest[..number_end];
        rest = &rest[number_end..];

        let unit_end = rest.find(is_number_char).unwrap_or(rest.len());
        let unit = &rest[..unit_end];
        rest = &rest[unit_end..];

        if number.is_empty() {
            return Err(invalid());
        }
        if unit.is_empty() {
            if number.bytes().all(|b| b == b'0' || b == b'.') && s == number && number != "." {
                // a bare "0" is a valid but useless interval
                return Err(IntervalError::Zero);
            }
            return Err(IntervalError::MissingUnit(s.to_string()));
        }
        let scale = unit_nanos(unit).ok_or_else(|| IntervalError::UnknownUnit {
            unit: unit.to_string(),
            input: s.to_string(),
        })?;

        let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
        if fraction.contains('.') || (whole.is_empty() && fraction.is_empty()) {
            return Err(invalid());
        }

        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| overflow())?
        };
        let mut nanos = whole.checked_mul(scale).ok_or_else(overflow)?;

        // digits past nanosecond precision are dropped
        let fraction = &fraction[..fraction.len().min(18)];
        if !fraction.is_empty() {
            let digits: u128 = fraction.parse().map_err(|_| invalid())?;
            let divisor = 10u128.pow(fraction.len() as u32);
            nanos += digits * scale / divisor;
        }

        total = total.checked_add(nanos).ok_or_else(overflow)?;
    }

    if total == 0 {
        return Err(IntervalError::Zero);
    }
    let nanos = u64::try_from(total).map_err(|_| overflow())?;
    Ok(Duration::from_nanos(nanos))
}
