//! Calendar times, MS-DOS packed times and FILETIME values.
//!
//! ZIP archives store modification times in three encodings:
//!
//! - the packed MS-DOS date/time in every header (2-second resolution,
//!   years 1980 to 2107),
//! - Unix epoch seconds in the extended timestamp extra block (0x5455),
//! - Windows FILETIME values in the NTFS extra block (0x000a).
//!
//! [`DateTime`] is a plain UTC calendar value used to move between them, and
//! [`Timestamp`] wraps a raw FILETIME.
//!
//! # Example
//!
//! ```rust
//! use zipwright::DateTime;
//!
//! let dt = DateTime::from_dos(0xFFFF_FFFF);
//! assert_eq!(dt, DateTime::new(2107, 12, 31, 23, 59, 59).unwrap());
//! ```

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Windows FILETIME epoch: January 1, 1601 (UTC)
/// Difference from Unix epoch (January 1, 1970) in 100-nanosecond intervals.
const FILETIME_UNIX_DIFF: u64 = 116444736000000000;

/// Number of 100-nanosecond intervals per second.
const INTERVALS_PER_SECOND: u64 = 10_000_000;

const SECONDS_PER_DAY: i64 = 86_400;

/// Returns the number of days in `month` of `year` (proleptic Gregorian).
pub(crate) fn days_in_month(year: u16, month: u8) -> u8 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if year % 4 == 0 && (year % 100 != 0 || year % 400 == 0) => 29,
        2 => 28,
        _ => 0,
    }
}

fn days_from_civil(year: i64, month: u8, day: u8) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = (if y >= 0 { y } else { y - 399 }) / 400;
    let yoe = y - era * 400;
    let mp = (i64::from(month) + 9) % 12;
    let doy = (153 * mp + 2) / 5 + i64::from(day) - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

fn civil_from_days(days: i64) -> (i64, u8, u8) {
    let z = days + 719_468;
    let era = (if z >= 0 { z } else { z - 146_096 }) / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u8;
    let month = if mp < 10 { mp + 3 } else { mp - 9 } as u8;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

/// A UTC calendar date and time with one-second resolution.
///
/// Field order makes the derived ordering chronological.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateTime {
    year: u16,
    month: u8,
    day: u8,
    hour: u8,
    minute: u8,
    second: u8,
}

impl DateTime {
    /// Earliest value representable as an MS-DOS time.
    pub const DOS_MIN: DateTime = DateTime {
        year: 1980,
        month: 1,
        day: 1,
        hour: 0,
        minute: 0,
        second: 0,
    };

    /// Latest value representable as an MS-DOS time.
    pub const DOS_MAX: DateTime = DateTime {
        year: 2107,
        month: 12,
        day: 31,
        hour: 23,
        minute: 59,
        second: 59,
    };

    /// The Unix epoch, 1970-01-01T00:00:00.
    pub const UNIX_EPOCH: DateTime = DateTime {
        year: 1970,
        month: 1,
        day: 1,
        hour: 0,
        minute: 0,
        second: 0,
    };

    /// Creates a date/time, returning `None` if any component is out of range.
    pub fn new(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Option<Self> {
        let valid = (1..=9999).contains(&year)
            && (1..=12).contains(&month)
            && day >= 1
            && day <= days_in_month(year, month)
            && hour < 24
            && minute < 60
            && second < 60;
        valid.then_some(Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
        })
    }

    /// Returns the current UTC time.
    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now())
    }

    /// Decodes a packed MS-DOS date/time.
    ///
    /// Out-of-range components are clamped rather than rejected, so every
    /// `u32` decodes to a valid value.
    pub fn from_dos(dos: u32) -> Self {
        let second = (2 * (dos & 0x1f)).min(59) as u8;
        let minute = ((dos >> 5) & 0x3f).min(59) as u8;
        let hour = ((dos >> 11) & 0x1f).min(23) as u8;
        let month = ((dos >> 21) & 0x0f).clamp(1, 12) as u8;
        let year = (((dos >> 25) & 0x7f) + 1980) as u16;
        let day = ((dos >> 16) & 0x1f).clamp(1, u32::from(days_in_month(year, month))) as u8;
        Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
        }
    }

    /// Encodes as a packed MS-DOS date/time.
    ///
    /// Values outside [`DOS_MIN`](Self::DOS_MIN)..=[`DOS_MAX`](Self::DOS_MAX)
    /// are clamped to the bounds. Odd seconds are rounded down.
    pub fn to_dos(&self) -> u32 {
        let dt = (*self).clamp(Self::DOS_MIN, Self::DOS_MAX);
        (u32::from(dt.year - 1980) << 25)
            | (u32::from(dt.month) << 21)
            | (u32::from(dt.day) << 16)
            | (u32::from(dt.hour) << 11)
            | (u32::from(dt.minute) << 5)
            | (u32::from(dt.second) >> 1)
    }

    /// Creates a date/time from Unix seconds, saturating at years 1 and 9999.
    pub fn from_unix_secs(secs: i64) -> Self {
        let days = secs.div_euclid(SECONDS_PER_DAY);
        let rem = secs.rem_euclid(SECONDS_PER_DAY);
        let (year, month, day) = civil_from_days(days);
        if year < 1 {
            return Self::new(1, 1, 1, 0, 0, 0).unwrap_or(Self::DOS_MIN);
        }
        if year > 9999 {
            return Self::new(9999, 12, 31, 23, 59, 59).unwrap_or(Self::DOS_MAX);
        }
        Self {
            year: year as u16,
            month,
            day,
            hour: (rem / 3600) as u8,
            minute: ((rem % 3600) / 60) as u8,
            second: (rem % 60) as u8,
        }
    }

    /// Returns seconds since the Unix epoch (negative before 1970).
    pub fn as_unix_secs(&self) -> i64 {
        days_from_civil(i64::from(self.year), self.month, self.day) * SECONDS_PER_DAY
            + i64::from(self.hour) * 3600
            + i64::from(self.minute) * 60
            + i64::from(self.second)
    }

    /// Converts a `SystemTime`, dropping sub-second precision.
    pub fn from_system_time(time: SystemTime) -> Self {
        let secs = match time.duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_secs() as i64,
            Err(e) => {
                let d = e.duration();
                let whole = d.as_secs() as i64;
                if d.subsec_nanos() > 0 {
                    -whole - 1
                } else {
                    -whole
                }
            }
        };
        Self::from_unix_secs(secs)
    }

    /// Converts to a `SystemTime`.
    pub fn as_system_time(&self) -> SystemTime {
        let secs = self.as_unix_secs();
        if secs >= 0 {
            UNIX_EPOCH + Duration::from_secs(secs as u64)
        } else {
            UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs())
        }
    }

    /// Returns this value shifted by `secs` seconds.
    pub fn add_seconds(&self, secs: i64) -> Self {
        Self::from_unix_secs(self.as_unix_secs().saturating_add(secs))
    }

    /// Year (1..=9999).
    pub fn year(&self) -> u16 {
        self.year
    }

    /// Month (1..=12).
    pub fn month(&self) -> u8 {
        self.month
    }

    /// Day of month (1..=31).
    pub fn day(&self) -> u8 {
        self.day
    }

    /// Hour (0..=23).
    pub fn hour(&self) -> u8 {
        self.hour
    }

    /// Minute (0..=59).
    pub fn minute(&self) -> u8 {
        self.minute
    }

    /// Second (0..=59).
    pub fn second(&self) -> u8 {
        self.second
    }
}

impl Default for DateTime {
    /// Returns [`DateTime::DOS_MIN`].
    fn default() -> Self {
        Self::DOS_MIN
    }
}

impl std::fmt::Display for DateTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

/// A Windows FILETIME value as stored in the NTFS extra block.
///
/// Counts 100-nanosecond intervals since January 1, 1601 (UTC).
///
/// # Example
///
/// ```rust
/// use zipwright::Timestamp;
/// use std::time::SystemTime;
///
/// let ts = Timestamp::from_filetime(116444736000000000);
/// assert_eq!(ts.as_unix_secs(), 0);
/// assert_eq!(ts.as_system_time(), SystemTime::UNIX_EPOCH);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    filetime: u64,
}

impl Timestamp {
    /// Creates a timestamp from a raw Windows FILETIME value.
    #[inline]
    pub const fn from_filetime(filetime: u64) -> Self {
        Self { filetime }
    }

    /// Returns the raw Windows FILETIME value.
    #[inline]
    pub const fn as_filetime(&self) -> u64 {
        self.filetime
    }

    /// Creates a timestamp from Unix seconds (since January 1, 1970).
    ///
    /// Returns `None` if the timestamp would overflow.
    pub fn from_unix_secs(secs: i64) -> Option<Self> {
        let intervals = secs.unsigned_abs().checked_mul(INTERVALS_PER_SECOND)?;
        if secs < 0 {
            FILETIME_UNIX_DIFF
                .checked_sub(intervals)
                .map(Self::from_filetime)
        } else {
            FILETIME_UNIX_DIFF
                .checked_add(intervals)
                .map(Self::from_filetime)
        }
    }

    /// Returns the timestamp as Unix seconds, rounding towards negative
    /// infinity.
    pub fn as_unix_secs(&self) -> i64 {
        if self.filetime >= FILETIME_UNIX_DIFF {
            ((self.filetime - FILETIME_UNIX_DIFF) / INTERVALS_PER_SECOND) as i64
        } else {
            let intervals = FILETIME_UNIX_DIFF - self.filetime;
            -(intervals.div_ceil(INTERVALS_PER_SECOND) as i64)
        }
    }

    /// Creates a timestamp from a `SystemTime`, keeping 100ns precision.
    pub fn from_system_time(time: SystemTime) -> Option<Self> {
        match time.duration_since(UNIX_EPOCH) {
            Ok(d) => {
                let base = Self::from_unix_secs(d.as_secs() as i64)?;
                base.filetime
                    .checked_add(u64::from(d.subsec_nanos()) / 100)
                    .map(Self::from_filetime)
            }
            Err(e) => {
                let d = e.duration();
                let intervals = d
                    .as_secs()
                    .checked_mul(INTERVALS_PER_SECOND)?
                    .checked_add(u64::from(d.subsec_nanos()) / 100)?;
                FILETIME_UNIX_DIFF
                    .checked_sub(intervals)
                    .map(Self::from_filetime)
            }
        }
    }

    /// Converts to a `SystemTime`, preserving 100ns precision.
    pub fn as_system_time(&self) -> SystemTime {
        let (intervals, after) = if self.filetime >= FILETIME_UNIX_DIFF {
            (self.filetime - FILETIME_UNIX_DIFF, true)
        } else {
            (FILETIME_UNIX_DIFF - self.filetime, false)
        };
        let duration = Duration::new(
            intervals / INTERVALS_PER_SECOND,
            ((intervals % INTERVALS_PER_SECOND) * 100) as u32,
        );
        if after {
            UNIX_EPOCH + duration
        } else {
            UNIX_EPOCH - duration
        }
    }

    /// Creates a timestamp from a calendar value.
    pub fn from_date_time(dt: &DateTime) -> Option<Self> {
        Self::from_unix_secs(dt.as_unix_secs())
    }

    /// Converts to a calendar value, truncating to whole seconds.
    pub fn to_date_time(&self) -> DateTime {
        DateTime::from_unix_secs(self.as_unix_secs())
    }
}

impl Default for Timestamp {
    /// Returns the Unix epoch (January 1, 1970).
    fn default() -> Self {
        Self::from_filetime(FILETIME_UNIX_DIFF)
    }
}

impl From<Timestamp> for SystemTime {
    fn from(ts: Timestamp) -> SystemTime {
        ts.as_system_time()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(y: u16, mo: u8, d: u8, h: u8, mi: u8, s: u8) -> DateTime {
        DateTime::new(y, mo, d, h, mi, s).expect("valid date")
    }

    #[test]
    fn test_dos_all_ones_decodes_to_max() {
        assert_eq!(DateTime::from_dos(0xFFFF_FFFF), dt(2107, 12, 31, 23, 59, 59));
    }

    #[test]
    fn test_dos_one_decodes_to_two_seconds() {
        assert_eq!(DateTime::from_dos(1), dt(1980, 1, 1, 0, 0, 2));
    }

    #[test]
    fn test_dos_zero_clamps_month_and_day() {
        assert_eq!(DateTime::from_dos(0), DateTime::DOS_MIN);
    }

    #[test]
    fn test_dos_day_clamped_to_month_length() {
        // February 31st, 2001
        let dos = (21 << 25) | (2 << 21) | (31 << 16);
        assert_eq!(DateTime::from_dos(dos), dt(2001, 2, 28, 0, 0, 0));
    }

    #[test]
    fn test_dos_encode_clamps_low() {
        let early = dt(1970, 6, 15, 12, 0, 0);
        assert_eq!(DateTime::from_dos(early.to_dos()), DateTime::DOS_MIN);
    }

    #[test]
    fn test_dos_encode_clamps_high() {
        let late = dt(2300, 1, 1, 0, 0, 0);
        // Seconds are stored halved, so 59 reads back as 58.
        assert_eq!(DateTime::from_dos(late.to_dos()), dt(2107, 12, 31, 23, 59, 58));
    }

    #[test]
    fn test_dos_roundtrip_even_seconds() {
        let value = dt(2012, 7, 4, 18, 30, 44);
        assert_eq!(DateTime::from_dos(value.to_dos()), value);
    }

    #[test]
    fn test_invalid_components_rejected() {
        assert!(DateTime::new(2023, 2, 29, 0, 0, 0).is_none());
        assert!(DateTime::new(2024, 2, 29, 0, 0, 0).is_some());
        assert!(DateTime::new(2024, 13, 1, 0, 0, 0).is_none());
        assert!(DateTime::new(2024, 1, 1, 24, 0, 0).is_none());
    }

    #[test]
    fn test_unix_secs_roundtrip() {
        for secs in [0i64, 1, 86_399, 951_782_400, 4_102_444_799, -1, -86_401] {
            assert_eq!(DateTime::from_unix_secs(secs).as_unix_secs(), secs);
        }
        assert_eq!(DateTime::from_unix_secs(0), DateTime::UNIX_EPOCH);
        assert_eq!(DateTime::from_unix_secs(951_782_400), dt(2000, 2, 29, 0, 0, 0));
    }

    #[test]
    fn test_add_seconds_crosses_day() {
        assert_eq!(
            dt(1999, 12, 31, 23, 59, 50).add_seconds(20),
            dt(2000, 1, 1, 0, 0, 10)
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(dt(2024, 3, 5, 7, 8, 9).to_string(), "2024-03-05T07:08:09Z");
    }

    #[test]
    fn test_filetime_unix_epoch() {
        let ts = Timestamp::from_filetime(FILETIME_UNIX_DIFF);
        assert_eq!(ts.as_unix_secs(), 0);
        assert_eq!(ts.as_system_time(), UNIX_EPOCH);
        assert_eq!(ts, Timestamp::default());
    }

    #[test]
    fn test_filetime_before_epoch_rounds_down() {
        let ts = Timestamp::from_filetime(FILETIME_UNIX_DIFF - 1);
        assert_eq!(ts.as_unix_secs(), -1);
    }

    #[test]
    fn test_filetime_date_time_roundtrip() {
        let value = dt(2010, 10, 10, 10, 10, 10);
        let ts = Timestamp::from_date_time(&value).expect("in range");
        assert_eq!(ts.to_date_time(), value);
    }

    #[test]
    fn test_filetime_system_time_precision() {
        let time = UNIX_EPOCH + Duration::new(1_000, 123_456_700);
        let ts = Timestamp::from_system_time(time).expect("in range");
        assert_eq!(ts.as_system_time(), time);
    }
}
