//! Spreadsheet date serials and date patterns.
//!
//! Serials follow the 1900 date system: day 1 is 1900-01-01 and the legacy
//! format counts a 29 February 1900 that never existed, so serials from 61
//! onwards are offset by one day.

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

/// Pattern used when a date column has no expression.
pub const DEFAULT_DATE_PATTERN: &str = "yyyy-MM-dd HH:mm:ss";

/// Days from 0001-01-01 (day 1) to 1899-12-30.
const EPOCH_1899_12_30: i32 = 693_594;

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Check if a built-in number format id is a date or time format
/// (14-22 dates, 45-47 times).
pub fn is_builtin_date_format(format_id: u32) -> bool {
    (14..=22).contains(&format_id) || (45..=47).contains(&format_id)
}

/// Convert a 1900-system serial number to a date-time.
///
/// The time fraction is rounded to the millisecond. Negative or non-finite
/// serials yield `None`.
pub fn serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }

    let mut days = serial.floor() as i64;
    let mut millis = ((serial - serial.floor()) * MILLIS_PER_DAY).round() as i64;
    if millis >= MILLIS_PER_DAY as i64 {
        days += 1;
        millis = 0;
    }

    // Serial 60 is the phantom 1900-02-29 and lands on 1 March like 61.
    let base = if days < 61 {
        EPOCH_1899_12_30 + 1
    } else {
        EPOCH_1899_12_30
    };
    let date = NaiveDate::from_num_days_from_ce_opt(base.checked_add(i32::try_from(days).ok()?)?)?;
    let time = NaiveTime::from_num_seconds_from_midnight_opt(
        (millis / 1000) as u32,
        ((millis % 1000) * 1_000_000) as u32,
    )?;

    Some(NaiveDateTime::new(date, time))
}

/// Convert a date-time to a 1900-system serial number.
pub fn datetime_to_serial(value: &NaiveDateTime) -> f64 {
    let mut days = (value.date().num_days_from_ce() - EPOCH_1899_12_30) as i64;
    if days < 61 {
        days -= 1;
    }

    let time = value.time();
    let millis = time.num_seconds_from_midnight() as i64 * 1000
        + (time.nanosecond() / 1_000_000) as i64;

    days as f64 + millis as f64 / MILLIS_PER_DAY
}

/// One element of a parsed date pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    /// A run of one pattern letter, e.g. `yyyy`
    Field(char, usize),
    /// Literal text
    Literal(String),
}

fn tokenize(pattern: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\'' {
            let mut literal = String::new();
            loop {
                match chars.next() {
                    Some('\'') if chars.peek() == Some(&'\'') => {
                        chars.next();
                        literal.push('\'');
                    }
                    Some('\'') | None => break,
                    Some(other) => literal.push(other),
                }
            }
            if literal.is_empty() {
                literal.push('\'');
            }
            tokens.push(Token::Literal(literal));
        } else if c.is_ascii_alphabetic() {
            let mut count = 1;
            while chars.peek() == Some(&c) {
                chars.next();
                count += 1;
            }
            tokens.push(Token::Field(c, count));
        } else {
            match tokens.last_mut() {
                Some(Token::Literal(text)) => text.push(c),
                _ => tokens.push(Token::Literal(c.to_string())),
            }
        }
    }

    tokens
}

/// Translate a date pattern into a `chrono` format string.
pub fn to_strftime(pattern: &str) -> String {
    let mut out = String::new();

    for token in tokenize(pattern) {
        match token {
            Token::Field(c, n) => out.push_str(match (c, n) {
                ('y', 2) => "%y",
                ('y', _) => "%Y",
                ('M', 1 | 2) => "%m",
                ('M', 3) => "%b",
                ('M', _) => "%B",
                ('d', _) => "%d",
                ('H', _) => "%H",
                ('h', _) => "%I",
                ('m', _) => "%M",
                ('s', _) => "%S",
                ('S', _) => "%3f",
                ('a', _) => "%p",
                _ => "",
            }),
            Token::Literal(text) => out.push_str(&text.replace('%', "%%")),
        }
    }

    out
}

/// Translate a date pattern into a spreadsheet number format code.
pub fn to_format_code(pattern: &str) -> String {
    let mut out = String::new();

    for token in tokenize(pattern) {
        match token {
            Token::Field(c, n) => out.push_str(match (c, n) {
                ('y', 2) => "yy",
                ('y', _) => "yyyy",
                ('M', 1) => "m",
                ('M', 2) => "mm",
                ('M', 3) => "mmm",
                ('M', _) => "mmmm",
                ('d', 1) => "d",
                ('d', _) => "dd",
                ('H', 1) | ('h', 1) => "h",
                ('H', _) | ('h', _) => "hh",
                ('m', _) => "mm",
                ('s', _) => "ss",
                ('S', _) => "000",
                ('a', _) => "AM/PM",
                _ => "",
            }),
            Token::Literal(text) => {
                if text
                    .chars()
                    .all(|c| matches!(c, '-' | '/' | ':' | ' ' | '.' | ','))
                {
                    out.push_str(&text);
                } else {
                    out.push('"');
                    out.push_str(&text.replace('"', "\\\""));
                    out.push('"');
                }
            }
        }
    }

    out
}

/// Parse text with a date pattern.
///
/// Patterns without time fields produce midnight.
pub fn parse_with_pattern(text: &str, pattern: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let format = to_strftime(pattern);
    NaiveDateTime::parse_from_str(text, &format)
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(text, &format)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_serial_to_datetime() {
        assert_eq!(serial_to_datetime(1.0), Some(ymd(1900, 1, 1)));
        assert_eq!(serial_to_datetime(2.0), Some(ymd(1900, 1, 2)));
        assert_eq!(serial_to_datetime(59.0), Some(ymd(1900, 2, 28)));
        assert_eq!(serial_to_datetime(60.0), Some(ymd(1900, 3, 1)));
        assert_eq!(serial_to_datetime(61.0), Some(ymd(1900, 3, 1)));
        assert_eq!(serial_to_datetime(44197.0), Some(ymd(2021, 1, 1)));
        assert_eq!(serial_to_datetime(45658.0), Some(ymd(2025, 1, 1)));
        assert_eq!(
            serial_to_datetime(44197.5),
            Some(ymd(2021, 1, 1) + chrono::Duration::hours(12))
        );
        assert_eq!(serial_to_datetime(-1.0), None);
        assert_eq!(serial_to_datetime(f64::NAN), None);
    }

    #[test]
    fn test_serial_round_trip() {
        let samples = [
            ymd(1900, 1, 1),
            ymd(1900, 2, 28),
            ymd(1900, 3, 1),
            ymd(2024, 2, 29),
            NaiveDate::from_ymd_opt(2023, 7, 14)
                .unwrap()
                .and_hms_milli_opt(18, 30, 5, 250)
                .unwrap(),
        ];
        for value in samples {
            assert_eq!(serial_to_datetime(datetime_to_serial(&value)), Some(value));
        }
        assert_eq!(datetime_to_serial(&ymd(2021, 1, 1)), 44197.0);
    }

    #[test]
    fn test_pattern_translation() {
        assert_eq!(to_strftime(DEFAULT_DATE_PATTERN), "%Y-%m-%d %H:%M:%S");
        assert_eq!(to_strftime("dd/MM/yy"), "%d/%m/%y");
        assert_eq!(to_strftime("yyyy'年'MM'%'"), "%Y年%m%%");

        assert_eq!(to_format_code(DEFAULT_DATE_PATTERN), "yyyy-mm-dd hh:mm:ss");
        assert_eq!(to_format_code("yyyy/MM/dd"), "yyyy/mm/dd");
        assert_eq!(to_format_code("HH:mm:ss.SSS"), "hh:mm:ss.000");
        assert_eq!(to_format_code("yyyy'年'"), "yyyy\"年\"");
    }

    #[test]
    fn test_parse_with_pattern() {
        assert_eq!(
            parse_with_pattern("2024-03-05 07:08:09", DEFAULT_DATE_PATTERN),
            NaiveDate::from_ymd_opt(2024, 3, 5).unwrap().and_hms_opt(7, 8, 9)
        );
        assert_eq!(parse_with_pattern("05/03/2024", "dd/MM/yyyy"), Some(ymd(2024, 3, 5)));
        assert_eq!(parse_with_pattern("not a date", "yyyy-MM-dd"), None);
        assert_eq!(parse_with_pattern("", "yyyy-MM-dd"), None);
    }
}
