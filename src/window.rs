//! Parsing for the `--from` / `--to` sync window.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, TimeDelta, Utc};

pub const DEFAULT_LOOKBACK_DAYS: i64 = 7;

/// Half-open `[from, to)` range of meeting start times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl SyncWindow {
    /// Resolve optional CLI values against `now`.
    pub fn resolve(from: Option<&str>, to: Option<&str>, now: DateTime<Utc>) -> Result<Self> {
        let from = match from {
            Some(value) => parse_time(value, now).context("Invalid --from")?,
            None => now - TimeDelta::days(DEFAULT_LOOKBACK_DAYS),
        };
        let to = match to {
            Some(value) => parse_time(value, now).context("Invalid --to")?,
            None => now,
        };
        if from >= to {
            bail!("Empty sync window: --from {} is not before --to {}", from, to);
        }
        Ok(Self { from, to })
    }

    pub fn contains(&self, time: DateTime<Utc>) -> bool {
        self.from <= time && time < self.to
    }
}

/// Accepts RFC 3339, `YYYY-MM-DD` (midnight UTC) or a relative offset such
/// as `5d`, `-12h`, `+1w`. Bare and `-` offsets are in the past.
pub fn parse_time(value: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(time) = DateTime::parse_from_rfc3339(value) {
        return Ok(time.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }
    let offset = parse_offset(value).with_context(|| format!("Unrecognized time '{value}'"))?;
    now.checked_add_signed(offset)
        .with_context(|| format!("Time '{value}' is out of range"))
}

fn parse_offset(value: &str) -> Result<TimeDelta> {
    let (sign, rest) = match value.strip_prefix('+') {
        Some(rest) => (1i64, rest),
        None => (-1, value.strip_prefix('-').unwrap_or(value)),
    };
    let Some(unit) = rest.chars().last() else {
        bail!("empty offset");
    };
    let amount: i64 = rest[..rest.len() - unit.len_utf8()]
        .parse()
        .context("offset must start with a whole number")?;
    let amount = amount
        .checked_mul(sign)
        .with_context(|| format!("offset '{value}' is too large"))?;
    let offset = match unit {
        'm' => TimeDelta::try_minutes(amount),
        'h' => TimeDelta::try_hours(amount),
        'd' => TimeDelta::try_days(amount),
        'w' => TimeDelta::try_weeks(amount),
        other => bail!("unknown offset unit '{other}', expected m, h, d or w"),
    };
    offset.with_context(|| format!("offset '{value}' is too large"))
}
