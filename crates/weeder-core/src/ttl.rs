use std::{fmt, str::FromStr, time::Duration};

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;
const WEEK: u64 = 7 * DAY;
const MONTH: u64 = 31 * DAY;
const YEAR: u64 = 366 * DAY;

/// A volume-level expiry duration in the backend's time-unit grammar: a decimal count
/// followed by one of `{m,h,d,w,M,y}` (minute, hour, day, week, 31-day month, 366-day
/// year). Unit-less input is minutes; empty input defaults to `"1M"`.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Ttl {
    count: u64,
    unit: Unit,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
enum Unit {
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl Unit {
    fn seconds(self) -> u64 {
        match self {
            Unit::Minute => MINUTE,
            Unit::Hour => HOUR,
            Unit::Day => DAY,
            Unit::Week => WEEK,
            Unit::Month => MONTH,
            Unit::Year => YEAR,
        }
    }

    fn letter(self) -> char {
        match self {
            Unit::Minute => 'm',
            Unit::Hour => 'h',
            Unit::Day => 'd',
            Unit::Week => 'w',
            Unit::Month => 'M',
            Unit::Year => 'y',
        }
    }
}

/// An empty or malformed TTL string was supplied where a non-default value was required.
#[derive(thiserror::Error, Debug, Eq, PartialEq)]
#[error("invalid ttl string: {0:?}")]
pub struct TtlParseError(pub String);

impl Ttl {
    /// The default TTL applied when no TTL string is supplied: one month.
    pub const DEFAULT: Ttl = Ttl { count: 1, unit: Unit::Month };

    /// Converts the TTL to a [`Duration`].
    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(self.count * self.unit.seconds())
    }
}

impl Default for Ttl {
    fn default() -> Self {
        Ttl::DEFAULT
    }
}

impl fmt::Display for Ttl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.count, self.unit.letter())
    }
}

impl FromStr for Ttl {
    type Err = TtlParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(Ttl::DEFAULT);
        }
        let (digits, unit) = match s.chars().last() {
            Some('m') => (&s[..s.len() - 1], Unit::Minute),
            Some('h') => (&s[..s.len() - 1], Unit::Hour),
            Some('d') => (&s[..s.len() - 1], Unit::Day),
            Some('w') => (&s[..s.len() - 1], Unit::Week),
            Some('M') => (&s[..s.len() - 1], Unit::Month),
            Some('y') => (&s[..s.len() - 1], Unit::Year),
            _ => (s, Unit::Minute),
        };
        let count: u64 = digits.parse().map_err(|_| TtlParseError(s.to_string()))?;
        Ok(Ttl { count, unit })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_unit() {
        assert_eq!("3m".parse::<Ttl>().unwrap().as_duration(), Duration::from_secs(3 * MINUTE));
        assert_eq!("4h".parse::<Ttl>().unwrap().as_duration(), Duration::from_secs(4 * HOUR));
        assert_eq!("5d".parse::<Ttl>().unwrap().as_duration(), Duration::from_secs(5 * DAY));
        assert_eq!("6w".parse::<Ttl>().unwrap().as_duration(), Duration::from_secs(6 * WEEK));
        assert_eq!("7M".parse::<Ttl>().unwrap().as_duration(), Duration::from_secs(7 * MONTH));
        assert_eq!("8y".parse::<Ttl>().unwrap().as_duration(), Duration::from_secs(8 * YEAR));
    }

    #[test]
    fn empty_defaults_to_one_month() {
        assert_eq!("".parse::<Ttl>().unwrap(), Ttl::DEFAULT);
    }

    #[test]
    fn unitless_means_minutes() {
        assert_eq!("42".parse::<Ttl>().unwrap().as_duration(), Duration::from_secs(42 * MINUTE));
    }

    #[test]
    fn rejects_garbage() {
        assert!("abc".parse::<Ttl>().is_err());
    }
}
