//! Human-readable duration strings used by job intervals, retry delays and
//! connection timings.

use std::time::Duration;

use crate::error::CoreError;

/// Parse a duration string into a [`Duration`].
///
/// Supports components `Xd`, `Xh`, `Xm`, `Xs` and `Xms`, combinable as
/// "1m30s" or "2h15m". A bare number is read as seconds.
pub fn parse_duration(s: &str) -> Result<Duration, CoreError> {
    let input = s.trim();
    if input.is_empty() {
        return Err(CoreError::InvalidDuration(s.to_string()));
    }
    let invalid = || CoreError::InvalidDuration(s.to_string());

    if input.chars().all(|c| c.is_ascii_digit()) {
        let secs: u64 = input.parse().map_err(|_| invalid())?;
        return Ok(Duration::from_secs(secs));
    }

    let mut total_ms: u64 = 0;
    let mut chars = input.chars().peekable();

    while chars.peek().is_some() {
        let mut num_buf = String::new();
        while let Some(c) = chars.peek().copied().filter(|c| c.is_ascii_digit()) {
            num_buf.push(c);
            chars.next();
        }
        let mut unit = String::new();
        while let Some(c) = chars.peek().copied().filter(|c| c.is_ascii_alphabetic()) {
            unit.push(c);
            chars.next();
        }
        if num_buf.is_empty() || unit.is_empty() {
            return Err(invalid());
        }
        let n: u64 = num_buf.parse().map_err(|_| invalid())?;
        let factor = match unit.as_str() {
            "ms" => 1,
            "s" => 1_000,
            "m" => 60_000,
            "h" => 3_600_000,
            "d" => 86_400_000,
            _ => return Err(invalid()),
        };
        total_ms = n
            .checked_mul(factor)
            .and_then(|v| total_ms.checked_add(v))
            .ok_or_else(invalid)?;
    }

    Ok(Duration::from_millis(total_ms))
}
