use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Anything that can be read as the calendar day a match was played.
///
/// Match tables carry `tourney_date` either as a compact `YYYYMMDD` number
/// (`20230710`), the same digits as a string, an ISO date (`2023-07-10`) or an
/// ISO datetime. All of them normalize to one [`NaiveDate`].
pub trait AnyMatchDate {
    fn to_match_date(self) -> Option<NaiveDate>;
}

impl AnyMatchDate for NaiveDate {
    fn to_match_date(self) -> Option<NaiveDate> {
        Some(self)
    }
}

impl AnyMatchDate for NaiveDateTime {
    fn to_match_date(self) -> Option<NaiveDate> {
        Some(self.date())
    }
}

impl AnyMatchDate for i64 {
    fn to_match_date(self) -> Option<NaiveDate> {
        if !(10_000_101..=99_991_231).contains(&self) {
            return None;
        }
        let year = i32::try_from(self / 10_000).ok()?;
        let month = u32::try_from(self / 100 % 100).ok()?;
        let day = u32::try_from(self % 100).ok()?;
        NaiveDate::from_ymd_opt(year, month, day)
    }
}

impl AnyMatchDate for &str {
    fn to_match_date(self) -> Option<NaiveDate> {
        let value = self.trim();

        if value.len() == 8 && value.bytes().all(|b| b.is_ascii_digit()) {
            return NaiveDate::parse_from_str(value, "%Y%m%d").ok();
        }

        // Integer columns read back as float text, e.g. "20230710.0"
        if let Some(digits) = value.strip_suffix(".0") {
            if digits.len() == 8 && digits.bytes().all(|b| b.is_ascii_digit()) {
                return NaiveDate::parse_from_str(digits, "%Y%m%d").ok();
            }
        }

        if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
            return Some(date);
        }
        if let Ok(datetime) = DateTime::parse_from_rfc3339(value) {
            return Some(datetime.date_naive());
        }
        // "2023-07-10 00:00:00", "2023-07-10T00:00:00.000" and friends
        value
            .get(..10)
            .filter(|_| value.as_bytes().get(10).is_some_and(|b| *b == b' ' || *b == b'T'))
            .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
    }
}

impl AnyMatchDate for String {
    fn to_match_date(self) -> Option<NaiveDate> {
        self.as_str().to_match_date()
    }
}
