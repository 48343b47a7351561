//! Timezone policy and the daily boundary window.
//!
//! Every timestamp is resolved to an absolute instant held in the configured
//! civil timezone. Values that carry an offset keep their instant; values
//! without one are read as civil time in that timezone. The window is built
//! from calendar dates so a day that crosses a DST change is 23 or 25 hours
//! long.

use crate::error::ConfigError;
use chrono::{
    DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc,
};
use chrono_tz::Tz;
use std::fmt;

/// An instant expressed in the configured civil timezone.
pub type CivilTime = DateTime<Tz>;

/// Timestamp formats carrying an explicit UTC offset.
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f %z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
];

/// Year-first civil formats.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

const MONTH_FIRST_FORMATS: &[&str] = &["%m/%d/%Y %H:%M:%S", "%m/%d/%Y %H:%M"];
const DAY_FIRST_FORMATS: &[&str] = &["%d/%m/%Y %H:%M:%S", "%d/%m/%Y %H:%M"];

/// Longest DST gap we step over when a boundary falls inside one.
const MAX_GAP_MINUTES: i64 = 180;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: CivilTime,
    pub end: CivilTime,
}

impl Window {
    /// Whether `instant` lies in `[start, end)`.
    pub fn contains(&self, instant: &CivilTime) -> bool {
        *instant >= self.start && *instant < self.end
    }

    /// Length of the window.
    pub fn duration(&self) -> Duration {
        self.end.signed_duration_since(self.start)
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {})",
            self.start.format("%Y-%m-%d %H:%M %Z"),
            self.end.format("%Y-%m-%d %H:%M %Z")
        )
    }
}

/// How timestamps are read and how the daily window is anchored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPolicy {
    /// Civil timezone for naive timestamps and the boundary hour.
    pub timezone: Tz,
    /// Hour of day (0-23) at which the operational day starts.
    pub boundary_hour: u32,
    /// Read `a/b/YYYY` as day/month instead of month/day.
    pub day_first: bool,
}

impl WindowPolicy {
    /// Create a policy with month-first slash dates.
    pub fn new(timezone: Tz, boundary_hour: u32) -> Self {
        Self {
            timezone,
            boundary_hour,
            day_first: false,
        }
    }

    /// Build a policy from configuration values.
    pub fn from_names(
        timezone: &str,
        boundary_hour: u32,
        day_first: bool,
    ) -> Result<Self, ConfigError> {
        let tz = parse_timezone(timezone)?;
        if boundary_hour > 23 {
            return Err(ConfigError::Validation(format!(
                "Boundary hour must be between 0 and 23, got {}",
                boundary_hour
            )));
        }

        Ok(Self {
            timezone: tz,
            boundary_hour,
            day_first,
        })
    }

    /// Window containing `now`.
    ///
    /// Before the boundary hour this is `[yesterday B:00, today B:00)`,
    /// otherwise `[today B:00, tomorrow B:00)`.
    pub fn window_at(&self, now: DateTime<Utc>) -> Window {
        let local = now.with_timezone(&self.timezone);
        let today = local.date_naive();

        let start_date = if local.hour() < self.boundary_hour {
            today.pred_opt().unwrap_or(today)
        } else {
            today
        };
        let end_date = start_date.succ_opt().unwrap_or(start_date);

        Window {
            start: self.boundary_on(start_date),
            end: self.boundary_on(end_date),
        }
    }

    /// Parse a cell into an instant, or `None` if it is not a timestamp.
    pub fn parse_timestamp(&self, raw: &str) -> Option<CivilTime> {
        let value = raw.trim();
        if value.is_empty() {
            return None;
        }

        if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
            return Some(dt.with_timezone(&self.timezone));
        }

        if let Some(dt) = self.parse_with_offset(value) {
            return Some(dt);
        }
        if let Some(dt) = expand_hour_offset(value).and_then(|v| self.parse_with_offset(&v)) {
            return Some(dt);
        }

        let naive = self.parse_naive(value)?;
        self.timezone.from_local_datetime(&naive).earliest()
    }

    /// Now, in the civil timezone.
    pub fn localize(&self, instant: DateTime<Utc>) -> CivilTime {
        instant.with_timezone(&self.timezone)
    }

    fn parse_with_offset(&self, value: &str) -> Option<CivilTime> {
        OFFSET_FORMATS
            .iter()
            .find_map(|format| DateTime::parse_from_str(value, format).ok())
            .map(|dt| dt.with_timezone(&self.timezone))
    }

    fn parse_naive(&self, value: &str) -> Option<NaiveDateTime> {
        let slash_formats = if self.day_first {
            DAY_FIRST_FORMATS
        } else {
            MONTH_FIRST_FORMATS
        };

        for format in NAIVE_FORMATS.iter().chain(slash_formats) {
            if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
                return Some(naive);
            }
        }

        let date_format = if self.day_first { "%d/%m/%Y" } else { "%m/%d/%Y" };
        ["%Y-%m-%d", date_format]
            .iter()
            .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
            .map(|date| date.and_time(NaiveTime::default()))
    }

    /// `B:00` on `date`, or the first existing minute after it.
    fn boundary_on(&self, date: NaiveDate) -> CivilTime {
        let time = NaiveTime::from_hms_opt(self.boundary_hour, 0, 0).unwrap_or_default();
        let mut naive = date.and_time(time);

        for _ in 0..=MAX_GAP_MINUTES {
            if let Some(instant) = self.timezone.from_local_datetime(&naive).earliest() {
                return instant;
            }
            naive += Duration::minutes(1);
        }

        self.timezone.from_utc_datetime(&naive)
    }
}

/// `07:00:00-03` becomes `07:00:00-0300`.
fn expand_hour_offset(value: &str) -> Option<String> {
    let bytes = value.as_bytes();
    let n = bytes.len();
    if n < 4 || !value.contains(':') {
        return None;
    }

    let sign = bytes[n - 3];
    let before = bytes[n - 4];
    if (sign == b'+' || sign == b'-')
        && bytes[n - 2].is_ascii_digit()
        && bytes[n - 1].is_ascii_digit()
        && (before.is_ascii_digit() || before == b' ')
    {
        Some(format!("{}00", value))
    } else {
        None
    }
}

/// Resolve an IANA timezone name.
pub fn parse_timezone(name: &str) -> Result<Tz, ConfigError> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| ConfigError::UnknownTimezone(name.to_string()))
}
