//! Calendar and duration values.
//!
//! Dates and date-times keep track of whether a timezone was given: a value
//! without a timezone is a different value from one with a `Z` offset, even
//! when both denote the same instant. Ordering comparisons treat a missing
//! timezone as UTC.

use crate::error::MetapathError;
use chrono::{Datelike, FixedOffset, Months, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike};
use regex::Regex;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::cmp::Ordering;
use std::fmt;
use std::sync::LazyLock;

static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(-?\d{4,})-(\d{2})-(\d{2})(Z|[+-]\d{2}:\d{2})?$")
        .expect("BUG: invalid DATE_RE regex literal")
});

static DATE_TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(-?\d{4,})-(\d{2})-(\d{2})T(\d{2}):(\d{2}):(\d{2})(\.\d+)?(Z|[+-]\d{2}:\d{2})?$",
    )
    .expect("BUG: invalid DATE_TIME_RE regex literal")
});

static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(-)?P(?:(\d+)Y)?(?:(\d+)M)?(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+(?:\.\d+)?)S)?)?$",
    )
    .expect("BUG: invalid DURATION_RE regex literal")
});

const SECONDS_PER_DAY: i64 = 86_400;

fn parse_timezone(text: &str) -> Option<FixedOffset> {
    if text == "Z" {
        return FixedOffset::east_opt(0);
    }
    let sign = if text.starts_with('-') { -1 } else { 1 };
    let hours: i32 = text.get(1..3)?.parse().ok()?;
    let minutes: i32 = text.get(4..6)?.parse().ok()?;
    if hours > 14 || minutes > 59 || (hours == 14 && minutes != 0) {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

fn write_timezone(f: &mut fmt::Formatter<'_>, timezone: Option<FixedOffset>) -> fmt::Result {
    let Some(offset) = timezone else {
        return Ok(());
    };
    let seconds = offset.local_minus_utc();
    if seconds == 0 {
        return f.write_str("Z");
    }
    let sign = if seconds < 0 { '-' } else { '+' };
    let seconds = seconds.abs();
    write!(f, "{}{:02}:{:02}", sign, seconds / 3600, (seconds % 3600) / 60)
}

fn write_year(f: &mut fmt::Formatter<'_>, year: i32) -> fmt::Result {
    if year < 0 {
        write!(f, "-{:04}", -year)
    } else {
        write!(f, "{:04}", year)
    }
}

fn parse_calendar(
    type_name: &str,
    text: &str,
    year: &str,
    month: &str,
    day: &str,
) -> Result<NaiveDate, MetapathError> {
    let invalid = || MetapathError::parse_value(type_name, text);
    let year: i32 = year.parse().map_err(|_| invalid())?;
    let month: u32 = month.parse().map_err(|_| invalid())?;
    let day: u32 = day.parse().map_err(|_| invalid())?;
    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(invalid)
}

fn to_utc(value: NaiveDateTime, timezone: Option<FixedOffset>) -> NaiveDateTime {
    let offset = timezone.map(|tz| tz.local_minus_utc()).unwrap_or(0);
    value
        .checked_sub_signed(TimeDelta::seconds(i64::from(offset)))
        .unwrap_or(value)
}

fn delta_to_seconds(delta: TimeDelta) -> Decimal {
    Decimal::from(delta.num_seconds()) + Decimal::new(i64::from(delta.subsec_nanos()), 9)
}

fn seconds_to_delta(seconds: Decimal) -> Result<TimeDelta, MetapathError> {
    let nanos = (seconds * Decimal::from(1_000_000_000))
        .trunc()
        .to_i64()
        .ok_or(MetapathError::Overflow)?;
    Ok(TimeDelta::nanoseconds(nanos))
}

fn shift_months(date: NaiveDate, months: i64) -> Result<NaiveDate, MetapathError> {
    let magnitude = u32::try_from(months.unsigned_abs()).map_err(|_| MetapathError::Overflow)?;
    let shifted = if months >= 0 {
        date.checked_add_months(Months::new(magnitude))
    } else {
        date.checked_sub_months(Months::new(magnitude))
    };
    shifted.ok_or(MetapathError::Overflow)
}

/// A calendar date with an optional timezone offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Date {
    date: NaiveDate,
    timezone: Option<FixedOffset>,
}

impl Date {
    pub fn new(date: NaiveDate, timezone: Option<FixedOffset>) -> Self {
        Self { date, timezone }
    }

    pub fn parse(text: &str) -> Result<Self, MetapathError> {
        let caps = DATE_RE
            .captures(text.trim())
            .ok_or_else(|| MetapathError::parse_value("date", text))?;
        let date = parse_calendar("date", text, &caps[1], &caps[2], &caps[3])?;
        let timezone = match caps.get(4) {
            Some(tz) => Some(
                parse_timezone(tz.as_str())
                    .ok_or_else(|| MetapathError::parse_value("date", text))?,
            ),
            None => None,
        };
        Ok(Self { date, timezone })
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn timezone(&self) -> Option<FixedOffset> {
        self.timezone
    }

    pub fn year(&self) -> i32 {
        self.date.year()
    }

    pub fn month(&self) -> u32 {
        self.date.month()
    }

    pub fn day(&self) -> u32 {
        self.date.day()
    }

    /// Midnight of this date, keeping the timezone.
    pub fn to_date_time(&self) -> DateTime {
        DateTime::new(self.date.and_time(NaiveTime::MIN), self.timezone)
    }

    fn instant(&self) -> NaiveDateTime {
        to_utc(self.date.and_time(NaiveTime::MIN), self.timezone)
    }

    /// Adds a duration. Only whole days of the day-time component apply.
    pub fn add(&self, duration: &Duration) -> Result<Self, MetapathError> {
        let date = shift_months(self.date, duration.months())?;
        let days = (duration.seconds() / Decimal::from(SECONDS_PER_DAY))
            .trunc()
            .to_i64()
            .ok_or(MetapathError::Overflow)?;
        let date = date
            .checked_add_signed(TimeDelta::try_days(days).ok_or(MetapathError::Overflow)?)
            .ok_or(MetapathError::Overflow)?;
        Ok(Self::new(date, self.timezone))
    }

    pub fn subtract(&self, other: &Date) -> Duration {
        Duration::from_seconds(delta_to_seconds(self.instant() - other.instant()))
    }

    /// Orders by instant, treating a missing timezone as UTC.
    pub fn compare(&self, other: &Date) -> Ordering {
        self.instant().cmp(&other.instant())
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_year(f, self.date.year())?;
        write!(f, "-{:02}-{:02}", self.date.month(), self.date.day())?;
        write_timezone(f, self.timezone)
    }
}

/// A date and time of day with an optional timezone offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DateTime {
    value: NaiveDateTime,
    timezone: Option<FixedOffset>,
}

impl DateTime {
    pub fn new(value: NaiveDateTime, timezone: Option<FixedOffset>) -> Self {
        Self { value, timezone }
    }

    /// The current instant, expressed in UTC.
    pub fn now() -> Self {
        Self::new(chrono::Utc::now().naive_utc(), FixedOffset::east_opt(0))
    }

    pub fn parse(text: &str) -> Result<Self, MetapathError> {
        let invalid = || MetapathError::parse_value("date-time", text);
        let caps = DATE_TIME_RE.captures(text.trim()).ok_or_else(invalid)?;
        let date = parse_calendar("date-time", text, &caps[1], &caps[2], &caps[3])?;
        let hour: u32 = caps[4].parse().map_err(|_| invalid())?;
        let minute: u32 = caps[5].parse().map_err(|_| invalid())?;
        let second: u32 = caps[6].parse().map_err(|_| invalid())?;
        let nanos = match caps.get(7) {
            Some(fraction) => {
                let digits: String = fraction.as_str()[1..].chars().take(9).collect();
                format!("{digits:0<9}").parse().map_err(|_| invalid())?
            }
            None => 0,
        };
        let value = date
            .and_hms_nano_opt(hour, minute, second, nanos)
            .ok_or_else(invalid)?;
        let timezone = match caps.get(8) {
            Some(tz) => Some(parse_timezone(tz.as_str()).ok_or_else(invalid)?),
            None => None,
        };
        Ok(Self { value, timezone })
    }

    pub fn value(&self) -> NaiveDateTime {
        self.value
    }

    pub fn timezone(&self) -> Option<FixedOffset> {
        self.timezone
    }

    /// The calendar date, dropping the time of day.
    pub fn to_date(&self) -> Date {
        Date::new(self.value.date(), self.timezone)
    }

    fn instant(&self) -> NaiveDateTime {
        to_utc(self.value, self.timezone)
    }

    pub fn add(&self, duration: &Duration) -> Result<Self, MetapathError> {
        let date = shift_months(self.value.date(), duration.months())?;
        let value = date
            .and_time(self.value.time())
            .checked_add_signed(seconds_to_delta(duration.seconds())?)
            .ok_or(MetapathError::Overflow)?;
        Ok(Self::new(value, self.timezone))
    }

    pub fn subtract(&self, other: &DateTime) -> Duration {
        Duration::from_seconds(delta_to_seconds(self.instant() - other.instant()))
    }

    pub fn compare(&self, other: &DateTime) -> Ordering {
        self.instant().cmp(&other.instant())
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_year(f, self.value.year())?;
        write!(
            f,
            "-{:02}-{:02}T{:02}:{:02}:{:02}",
            self.value.month(),
            self.value.day(),
            self.value.hour(),
            self.value.minute(),
            self.value.second()
        )?;
        let nanos = self.value.nanosecond();
        if nanos > 0 {
            let fraction = format!("{nanos:09}");
            write!(f, ".{}", fraction.trim_end_matches('0'))?;
        }
        write_timezone(f, self.timezone)
    }
}

/// A duration split into a year-month part and a day-time part (in seconds).
/// Both parts carry the same sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Duration {
    months: i64,
    seconds: Decimal,
}

impl Duration {
    pub fn new(months: i64, seconds: Decimal) -> Self {
        Self {
            months,
            seconds: seconds.normalize(),
        }
    }

    pub fn from_seconds(seconds: Decimal) -> Self {
        Self::new(0, seconds)
    }

    pub fn zero() -> Self {
        Self::new(0, Decimal::ZERO)
    }

    pub fn parse(text: &str) -> Result<Self, MetapathError> {
        let trimmed = text.trim();
        let invalid = || MetapathError::parse_value("duration", text);
        let caps = DURATION_RE.captures(trimmed).ok_or_else(invalid)?;
        if trimmed.ends_with('P') || trimmed.ends_with('T') {
            return Err(invalid());
        }
        let component = |index: usize| -> Result<i64, MetapathError> {
            caps.get(index)
                .map(|m| m.as_str().parse::<i64>().map_err(|_| invalid()))
                .transpose()
                .map(|value| value.unwrap_or(0))
        };
        let months = component(2)?
            .checked_mul(12)
            .and_then(|m| m.checked_add(component(3).ok()?))
            .ok_or(MetapathError::Overflow)?;
        let whole = component(4)?
            .checked_mul(SECONDS_PER_DAY)
            .and_then(|s| s.checked_add(component(5).ok()?.checked_mul(3600)?))
            .and_then(|s| s.checked_add(component(6).ok()?.checked_mul(60)?))
            .ok_or(MetapathError::Overflow)?;
        let fraction = match caps.get(7) {
            Some(m) => m.as_str().parse::<Decimal>().map_err(|_| invalid())?,
            None => Decimal::ZERO,
        };
        let seconds = Decimal::from(whole) + fraction;
        Ok(if caps.get(1).is_some() {
            Self::new(-months, -seconds)
        } else {
            Self::new(months, seconds)
        })
    }

    pub fn months(&self) -> i64 {
        self.months
    }

    pub fn seconds(&self) -> Decimal {
        self.seconds
    }

    pub fn is_zero(&self) -> bool {
        self.months == 0 && self.seconds.is_zero()
    }

    pub fn negate(&self) -> Self {
        Self::new(-self.months, -self.seconds)
    }

    pub fn add(&self, other: &Duration) -> Result<Self, MetapathError> {
        let months = self
            .months
            .checked_add(other.months)
            .ok_or(MetapathError::Overflow)?;
        let seconds = self
            .seconds
            .checked_add(other.seconds)
            .ok_or(MetapathError::Overflow)?;
        Ok(Self::new(months, seconds))
    }

    /// Durations are ordered only when both parts agree on the direction.
    pub fn compare(&self, other: &Duration) -> Option<Ordering> {
        match (
            self.months.cmp(&other.months),
            self.seconds.cmp(&other.seconds),
        ) {
            (a, b) if a == b => Some(a),
            (Ordering::Equal, b) => Some(b),
            (a, Ordering::Equal) => Some(a),
            _ => None,
        }
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            return f.write_str("PT0S");
        }
        if self.months < 0 || self.seconds.is_sign_negative() {
            f.write_str("-")?;
        }
        f.write_str("P")?;
        let months = self.months.unsigned_abs();
        if months >= 12 {
            write!(f, "{}Y", months / 12)?;
        }
        if months % 12 != 0 {
            write!(f, "{}M", months % 12)?;
        }
        let seconds = self.seconds.abs();
        let day = Decimal::from(SECONDS_PER_DAY);
        let days = (seconds / day).trunc();
        let mut rest = seconds - days * day;
        if !days.is_zero() {
            write!(f, "{}D", days)?;
        }
        if !rest.is_zero() {
            f.write_str("T")?;
            let hours = (rest / Decimal::from(3600)).trunc();
            rest -= hours * Decimal::from(3600);
            let minutes = (rest / Decimal::from(60)).trunc();
            rest -= minutes * Decimal::from(60);
            if !hours.is_zero() {
                write!(f, "{}H", hours)?;
            }
            if !minutes.is_zero() {
                write!(f, "{}M", minutes)?;
            }
            if !rest.is_zero() {
                write!(f, "{}S", rest.normalize())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_round_trip_without_timezone() {
        let date = Date::parse("2024-02-29").unwrap();
        assert!(date.timezone().is_none());
        assert_eq!(date.to_string(), "2024-02-29");
        assert_eq!(Date::parse(&date.to_string()).unwrap(), date);
    }

    #[test]
    fn test_date_round_trip_with_timezone() {
        let date = Date::parse("2024-03-01-05:30").unwrap();
        assert_eq!(date.timezone().map(|tz| tz.local_minus_utc()), Some(-19_800));
        assert_eq!(date.to_string(), "2024-03-01-05:30");

        let utc = Date::parse("2024-03-01+00:00").unwrap();
        assert_eq!(utc.to_string(), "2024-03-01Z");
        assert_eq!(Date::parse("2024-03-01Z").unwrap(), utc);
    }

    #[test]
    fn test_date_leap_year_validation() {
        assert!(Date::parse("2023-02-29").is_err());
        assert!(Date::parse("1900-02-29").is_err());
        assert!(Date::parse("2000-02-29").is_ok());
        assert!(Date::parse("2024-13-01").is_err());
        assert!(Date::parse("2024-01-01+15:00").is_err());
    }

    #[test]
    fn test_timezone_presence_is_identity() {
        let local = Date::parse("2024-01-01").unwrap();
        let utc = Date::parse("2024-01-01Z").unwrap();
        assert_ne!(local, utc);
        assert_eq!(local.compare(&utc), Ordering::Equal);
    }

    #[test]
    fn test_date_time_parse_and_format() {
        let dt = DateTime::parse("2024-05-06T07:08:09.250+02:00").unwrap();
        assert_eq!(dt.to_string(), "2024-05-06T07:08:09.25+02:00");
        assert_eq!(dt.to_date().to_string(), "2024-05-06+02:00");
        assert!(DateTime::parse("2024-05-06T25:00:00").is_err());
    }

    #[test]
    fn test_duration_canonical_form() {
        let duration = Duration::parse("P1Y14M2DT25H0M3.50S").unwrap();
        assert_eq!(duration.months(), 26);
        assert_eq!(duration.to_string(), "P2Y2M3DT1H3.5S");
        assert_eq!(Duration::parse("-PT90M").unwrap().to_string(), "-PT1H30M");
        assert_eq!(Duration::parse("P0D").unwrap().to_string(), "PT0S");
        assert!(Duration::parse("P").is_err());
        assert!(Duration::parse("P1DT").is_err());
    }

    #[test]
    fn test_date_arithmetic() {
        let date = Date::parse("2024-01-31").unwrap();
        let later = date.add(&Duration::parse("P1M").unwrap()).unwrap();
        assert_eq!(later.to_string(), "2024-02-29");

        let diff = Date::parse("2024-03-01")
            .unwrap()
            .subtract(&Date::parse("2024-02-28").unwrap());
        assert_eq!(diff.to_string(), "P2D");

        let dt = DateTime::parse("2024-01-01T23:30:00Z").unwrap();
        let shifted = dt.add(&Duration::parse("PT45M").unwrap()).unwrap();
        assert_eq!(shifted.to_string(), "2024-01-02T00:15:00Z");
    }

    #[test]
    fn test_duration_ordering() {
        let month = Duration::parse("P1M").unwrap();
        let days = Duration::parse("P30D").unwrap();
        assert_eq!(month.compare(&days), None);
        let year = Duration::parse("P1Y").unwrap();
        assert_eq!(month.compare(&year), Some(Ordering::Less));
    }
}
