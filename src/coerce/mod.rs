//! Conversion between raw cells and typed scalar values.
//!
//! Reading never fails: a cell that cannot be interpreted as the target kind
//! yields `None` and the field is left untouched. Writing always produces a
//! cell, even for an absent value, so the declared cell type survives.

pub mod date;

use crate::value::{CellData, CellOutput, CellType, ScalarKind, Value};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

/// Number format id of the built-in text format (`@`).
pub const TEXT_FORMAT_ID: u32 = 49;

/// Number format applied to integer cells.
pub const INTEGER_FORMAT: &str = "0";

/// Largest scale a decimal can carry.
const MAX_SCALE: u32 = 28;

/// Interpret a raw cell as a value of `kind`.
///
/// `format_id` is the numeric format id of numeric cells; `expression` is
/// the column's scale or date pattern.
pub fn read_cell(
    kind: ScalarKind,
    data: &CellData,
    format_id: Option<u32>,
    expression: Option<&str>,
) -> Option<Value> {
    match kind {
        ScalarKind::Float => read_float(data, expression).map(Value::Float),
        ScalarKind::Decimal => read_decimal(data, expression).map(Value::Decimal),
        ScalarKind::Int => read_integral(data)
            .and_then(|d| d.to_i32())
            .map(Value::Int),
        ScalarKind::Long => read_integral(data)
            .and_then(|d| d.to_i64())
            .map(Value::Long),
        ScalarKind::Bool => read_bool(data).map(Value::Bool),
        ScalarKind::Date => read_date(data, format_id, expression).map(Value::Date),
        ScalarKind::Text => read_text(data).map(Value::Text),
    }
}

/// Parse decimal text, accepting plain and scientific notation.
pub fn parse_decimal(text: &str) -> Option<Decimal> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}

/// Parse floating point text; infinities and NaN are rejected.
pub fn parse_float(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Scale encoded in a column expression.
pub fn scale(expression: Option<&str>) -> Option<u32> {
    expression
        .and_then(|e| e.trim().parse::<u32>().ok())
        .map(|s| s.min(MAX_SCALE))
}

fn round_half_up(value: Decimal, scale: u32) -> Decimal {
    value.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero)
}

/// Round half-up to `scale` places.
///
/// Values a decimal holds exactly are rounded on their shortest decimal
/// text; anything outside the decimal range is rounded in binary.
fn round_float(value: f64, scale: u32) -> f64 {
    if let Some(exact) = exact_decimal(value) {
        return round_half_up(exact, scale)
            .to_string()
            .parse()
            .unwrap_or(value);
    }
    if value.fract() == 0.0 {
        return value;
    }
    let factor = 10f64.powi(scale as i32);
    let scaled = value * factor;
    if scaled.is_finite() {
        scaled.round() / factor
    } else {
        value
    }
}

/// The decimal with the same shortest text as `value`, if it parses back
/// to the same float.
fn exact_decimal(value: f64) -> Option<Decimal> {
    Decimal::from_str(&value.to_string())
        .ok()
        .filter(|d| d.to_string().parse::<f64>() == Ok(value))
}

/// Shortest text that parses back to `value`, in exponent form for very
/// large and very small magnitudes.
fn float_text(value: f64) -> String {
    let magnitude = value.abs();
    if magnitude == 0.0 || (1e-7..1e21).contains(&magnitude) {
        value.to_string()
    } else {
        format!("{:E}", value)
    }
}

fn numeric_text(data: &CellData) -> Option<&str> {
    match data {
        CellData::Number(s) | CellData::Text(s) => Some(s),
        CellData::Empty | CellData::Bool(_) => None,
    }
}

fn read_decimal(data: &CellData, expression: Option<&str>) -> Option<Decimal> {
    let value = parse_decimal(numeric_text(data)?)?;
    Some(match scale(expression) {
        Some(scale) => round_half_up(value, scale),
        None => value,
    })
}

fn read_float(data: &CellData, expression: Option<&str>) -> Option<f64> {
    let value = parse_float(numeric_text(data)?)?;
    Some(match scale(expression) {
        Some(scale) => round_float(value, scale),
        None => value,
    })
}

fn read_integral(data: &CellData) -> Option<Decimal> {
    parse_decimal(numeric_text(data)?).map(|d| d.trunc())
}

fn read_bool(data: &CellData) -> Option<bool> {
    match data {
        CellData::Empty => Some(false),
        CellData::Bool(b) => Some(*b),
        CellData::Number(text) => {
            let value = parse_decimal(text)?;
            if value == Decimal::ONE {
                Some(true)
            } else if value.is_zero() {
                Some(false)
            } else {
                None
            }
        }
        CellData::Text(text) => {
            let text = text.trim();
            if text.eq_ignore_ascii_case("true") || text == "1" {
                Some(true)
            } else if text.eq_ignore_ascii_case("false") || text == "0" {
                Some(false)
            } else {
                // Anything else is true unless it starts with '0'.
                Some(text.chars().next().is_some_and(|c| c != '0'))
            }
        }
    }
}

fn read_date(
    data: &CellData,
    format_id: Option<u32>,
    expression: Option<&str>,
) -> Option<chrono::NaiveDateTime> {
    let pattern = expression.unwrap_or(date::DEFAULT_DATE_PATTERN);
    match data {
        CellData::Number(text) if !is_textual_format(format_id) => {
            date::serial_to_datetime(text.trim().parse::<f64>().ok()?)
        }
        CellData::Number(text) | CellData::Text(text) => date::parse_with_pattern(text, pattern),
        CellData::Empty | CellData::Bool(_) => None,
    }
}

fn is_textual_format(format_id: Option<u32>) -> bool {
    matches!(format_id, None | Some(TEXT_FORMAT_ID))
}

fn read_text(data: &CellData) -> Option<String> {
    match data {
        CellData::Empty => None,
        CellData::Text(text) => Some(text.clone()),
        CellData::Bool(b) => Some(b.to_string()),
        CellData::Number(text) => Some(render_number(text)),
    }
}

/// Render numeric text without a fractional part when it is integral.
pub fn render_number(text: &str) -> String {
    match parse_decimal(text) {
        Some(value) if value.fract().is_zero() => value.trunc().normalize().to_string(),
        Some(value) => value.normalize().to_string(),
        None => text.trim().to_string(),
    }
}

/// Format a value of `kind` as an output cell.
///
/// An absent value produces an empty cell that keeps the declared type and
/// number format.
pub fn write_cell(kind: ScalarKind, value: Option<&Value>, expression: Option<&str>) -> CellOutput {
    match kind {
        ScalarKind::Int | ScalarKind::Long => CellOutput {
            cell_type: CellType::Numeric,
            data: number_data(value.and_then(as_decimal).map(|d| d.trunc())),
            format: Some(INTEGER_FORMAT.to_string()),
        },
        ScalarKind::Float | ScalarKind::Decimal => {
            let scale = scale(expression);
            let data = match value {
                Some(Value::Float(f)) if f.is_finite() => {
                    CellData::Number(float_text(scale.map_or(*f, |s| round_float(*f, s))))
                }
                Some(Value::Float(_)) => CellData::Empty,
                _ => number_data(
                    value
                        .and_then(as_decimal)
                        .map(|d| scale.map_or(d, |s| round_half_up(d, s))),
                ),
            };
            CellOutput {
                cell_type: CellType::Numeric,
                data,
                format: scale.map(decimal_format),
            }
        }
        ScalarKind::Bool => CellOutput {
            cell_type: CellType::Boolean,
            data: match value {
                Some(Value::Bool(b)) => CellData::Bool(*b),
                Some(other) => read_bool(&CellData::Text(other.to_string()))
                    .map_or(CellData::Empty, CellData::Bool),
                None => CellData::Empty,
            },
            format: None,
        },
        ScalarKind::Date => {
            let pattern = expression.unwrap_or(date::DEFAULT_DATE_PATTERN);
            CellOutput {
                cell_type: CellType::Numeric,
                data: match value {
                    Some(Value::Date(dt)) => {
                        CellData::Number(date::datetime_to_serial(dt).to_string())
                    }
                    _ => CellData::Empty,
                },
                format: Some(date::to_format_code(pattern)),
            }
        }
        ScalarKind::Text => CellOutput {
            cell_type: CellType::Text,
            data: value.map_or(CellData::Empty, |v| CellData::Text(v.to_string())),
            format: None,
        },
    }
}

fn number_data(value: Option<Decimal>) -> CellData {
    value.map_or(CellData::Empty, |d| CellData::Number(d.to_string()))
}

fn as_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Int(v) => Some(Decimal::from(*v)),
        Value::Long(v) => Some(Decimal::from(*v)),
        Value::Float(v) if v.is_finite() => Decimal::from_str(&v.to_string()).ok(),
        Value::Float(_) => None,
        Value::Decimal(v) => Some(*v),
        Value::Bool(v) => Some(if *v { Decimal::ONE } else { Decimal::ZERO }),
        Value::Date(v) => Decimal::from_str(&date::datetime_to_serial(v).to_string()).ok(),
        Value::Text(v) => parse_decimal(v),
    }
}

fn decimal_format(scale: u32) -> String {
    if scale == 0 {
        INTEGER_FORMAT.to_string()
    } else {
        format!("0.{}", "0".repeat(scale as usize))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn num(s: &str) -> CellData {
        CellData::Number(s.to_string())
    }

    fn text(s: &str) -> CellData {
        CellData::Text(s.to_string())
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_read_decimal_rounding() {
        assert_eq!(
            read_cell(ScalarKind::Decimal, &num("1.23456"), Some(0), Some("4")),
            Some(Value::Decimal(dec("1.2346")))
        );
        assert_eq!(
            read_cell(ScalarKind::Decimal, &num("2.5"), Some(0), Some("0")),
            Some(Value::Decimal(dec("3")))
        );
        assert_eq!(
            read_cell(ScalarKind::Decimal, &num("-2.5"), Some(0), Some("0")),
            Some(Value::Decimal(dec("-3")))
        );
        assert_eq!(
            read_cell(ScalarKind::Decimal, &num("0.1000000000000000055"), Some(0), None),
            Some(Value::Decimal(dec("0.1000000000000000055")))
        );
        assert_eq!(
            read_cell(ScalarKind::Decimal, &num("1.5E-3"), Some(0), None),
            Some(Value::Decimal(dec("0.0015")))
        );
        assert_eq!(read_cell(ScalarKind::Decimal, &text("abc"), None, None), None);
        assert_eq!(read_cell(ScalarKind::Decimal, &CellData::Empty, None, None), None);
    }

    #[test]
    fn test_read_float() {
        assert_eq!(
            read_cell(ScalarKind::Float, &num("3.14159"), Some(0), None),
            Some(Value::Float(3.14159))
        );
        assert_eq!(
            read_cell(ScalarKind::Float, &num("3.14159"), Some(0), Some("2")),
            Some(Value::Float(3.14))
        );
        // A non-numeric scale expression keeps full precision
        assert_eq!(
            read_cell(ScalarKind::Float, &num("0.125"), Some(0), Some("x")),
            Some(Value::Float(0.125))
        );
    }

    #[test]
    fn test_float_range_beyond_decimal() {
        let read = |s: &str| read_cell(ScalarKind::Float, &num(s), Some(0), None);
        assert_eq!(read("1E+30"), Some(Value::Float(1e30)));
        assert_eq!(read("1.5E-30"), Some(Value::Float(1.5e-30)));
        assert_eq!(read("1.7976931348623157E+308"), Some(Value::Float(f64::MAX)));
        assert_eq!(read("inf"), None);

        // Scaled reads keep magnitudes a decimal cannot hold
        assert_eq!(
            read_cell(ScalarKind::Float, &num("1E+30"), Some(0), Some("2")),
            Some(Value::Float(1e30))
        );
        assert_eq!(
            read_cell(ScalarKind::Float, &num("1.005"), Some(0), Some("2")),
            Some(Value::Float(1.01))
        );

        let write = |f: f64| write_cell(ScalarKind::Float, Some(&Value::Float(f)), None).data;
        assert_eq!(write(1e-30), num("1E-30"));
        assert_eq!(write(1e30), num("1E30"));
        assert_eq!(write(-2.5e-12), num("-2.5E-12"));
        assert_eq!(write(f64::MAX), num("1.7976931348623157E308"));
        assert_eq!(write(f64::NAN), CellData::Empty);

        for value in [1e-30, 1.5e-30, 1e30, f64::MAX, f64::MIN_POSITIVE, 123.456] {
            let CellData::Number(text) = write(value) else {
                panic!("no number written for {value}");
            };
            assert_eq!(read(text.as_str()), Some(Value::Float(value)));
        }
    }

    #[test]
    fn test_read_integers_truncate() {
        assert_eq!(read_cell(ScalarKind::Int, &num("42.9"), Some(0), None), Some(Value::Int(42)));
        assert_eq!(read_cell(ScalarKind::Int, &num("-42.9"), Some(0), None), Some(Value::Int(-42)));
        assert_eq!(
            read_cell(ScalarKind::Long, &num("9007199254740993"), Some(0), None),
            Some(Value::Long(9_007_199_254_740_993))
        );
        assert_eq!(read_cell(ScalarKind::Int, &num("3000000000"), Some(0), None), None);
        assert_eq!(read_cell(ScalarKind::Int, &text("seven"), None, None), None);
    }

    #[test]
    fn test_read_bool() {
        let read = |data: CellData| read_cell(ScalarKind::Bool, &data, None, None);

        assert_eq!(read(CellData::Empty), Some(Value::Bool(false)));
        assert_eq!(read(CellData::Bool(true)), Some(Value::Bool(true)));
        assert_eq!(read(num("1")), Some(Value::Bool(true)));
        assert_eq!(read(num("0.0")), Some(Value::Bool(false)));
        assert_eq!(read(num("2")), None);
        assert_eq!(read(text("TRUE")), Some(Value::Bool(true)));
        assert_eq!(read(text("false")), Some(Value::Bool(false)));
        assert_eq!(read(text("0")), Some(Value::Bool(false)));
        // Fallback heuristic: first character other than '0' reads as true
        assert_eq!(read(text("yes")), Some(Value::Bool(true)));
        assert_eq!(read(text("no")), Some(Value::Bool(true)));
        assert_eq!(read(text("0x")), Some(Value::Bool(false)));
    }

    #[test]
    fn test_read_date() {
        let noon = NaiveDate::from_ymd_opt(2021, 1, 1).unwrap().and_hms_opt(12, 0, 0).unwrap();
        assert_eq!(
            read_cell(ScalarKind::Date, &num("44197.5"), Some(14), None),
            Some(Value::Date(noon))
        );
        // General format still counts as a serial
        assert_eq!(
            read_cell(ScalarKind::Date, &num("44197.5"), Some(0), None),
            Some(Value::Date(noon))
        );
        // Text format or no format: parse with the pattern
        assert_eq!(
            read_cell(ScalarKind::Date, &text("2021/01/01"), None, Some("yyyy/MM/dd")),
            Some(Value::Date(noon - chrono::Duration::hours(12)))
        );
        assert_eq!(
            read_cell(ScalarKind::Date, &num("44197.5"), Some(TEXT_FORMAT_ID), None),
            None
        );
        assert_eq!(read_cell(ScalarKind::Date, &text("soon"), None, None), None);
    }

    #[test]
    fn test_read_text() {
        let read = |data: CellData| read_cell(ScalarKind::Text, &data, Some(0), None);

        assert_eq!(read(num("42")), Some(Value::Text("42".into())));
        assert_eq!(read(num("42.0")), Some(Value::Text("42".into())));
        assert_eq!(read(num("1E+3")), Some(Value::Text("1000".into())));
        assert_eq!(read(num("2.50")), Some(Value::Text("2.5".into())));
        assert_eq!(read(CellData::Bool(false)), Some(Value::Text("false".into())));
        assert_eq!(read(text(" keep ")), Some(Value::Text(" keep ".into())));
        assert_eq!(read(CellData::Empty), None);
    }

    #[test]
    fn test_write_numbers() {
        let out = write_cell(ScalarKind::Long, Some(&Value::Long(12)), None);
        assert_eq!(out.cell_type, CellType::Numeric);
        assert_eq!(out.data, num("12"));
        assert_eq!(out.format.as_deref(), Some("0"));

        let out = write_cell(ScalarKind::Decimal, Some(&Value::Decimal(dec("1.23456"))), Some("4"));
        assert_eq!(out.data, num("1.2346"));
        assert_eq!(out.format.as_deref(), Some("0.0000"));

        let out = write_cell(ScalarKind::Float, Some(&Value::Float(0.1)), None);
        assert_eq!(out.data, num("0.1"));
        assert_eq!(out.format, None);

        let out = write_cell(ScalarKind::Float, Some(&Value::Float(2.675)), Some("2"));
        assert_eq!(out.data, num("2.68"));
        assert_eq!(out.format.as_deref(), Some("0.00"));
    }

    #[test]
    fn test_write_absent_keeps_type() {
        let out = write_cell(ScalarKind::Bool, None, None);
        assert_eq!(out.cell_type, CellType::Boolean);
        assert_eq!(out.data, CellData::Empty);

        let out = write_cell(ScalarKind::Int, None, None);
        assert_eq!(out.cell_type, CellType::Numeric);
        assert_eq!(out.data, CellData::Empty);

        let out = write_cell(ScalarKind::Date, None, Some("yyyy-MM-dd"));
        assert_eq!(out.cell_type, CellType::Numeric);
        assert_eq!(out.format.as_deref(), Some("yyyy-mm-dd"));
    }

    #[test]
    fn test_write_date() {
        let value = NaiveDate::from_ymd_opt(2021, 1, 1).unwrap().and_hms_opt(12, 0, 0).unwrap();
        let out = write_cell(ScalarKind::Date, Some(&Value::Date(value)), None);
        assert_eq!(out.data, num("44197.5"));
        assert_eq!(out.format.as_deref(), Some("yyyy-mm-dd hh:mm:ss"));
    }

    #[test]
    fn test_decimal_write_read_write_idempotent() {
        let first = write_cell(ScalarKind::Decimal, Some(&Value::Decimal(dec("9.876543"))), Some("4"));
        let read = read_cell(ScalarKind::Decimal, &first.data, Some(164), Some("4"));
        let second = write_cell(ScalarKind::Decimal, read.as_ref(), Some("4"));
        assert_eq!(first, second);
        assert_eq!(second.data, num("9.8765"));
    }
}
