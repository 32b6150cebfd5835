//! XLSX styles parsing for number formats.

use crate::coerce::date::is_builtin_date_format;
use quick_xml::events::{BytesStart, Event};
use std::collections::HashMap;

/// Number format information parsed from xl/styles.xml.
#[derive(Debug, Default)]
pub struct Styles {
    /// Custom number formats: numFmtId -> formatCode
    num_fmts: HashMap<u32, String>,
    /// Cell style formats: style index -> numFmtId
    cell_xfs: Vec<u32>,
}

impl Styles {
    /// Parse styles from xl/styles.xml content.
    ///
    /// Malformed content yields whatever was parsed before the error; cells
    /// then fall back to the General format.
    pub fn parse(xml: &str) -> Self {
        let mut styles = Self::default();
        let mut reader = quick_xml::Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut buf = Vec::new();
        let mut in_num_fmts = false;
        let mut in_cell_xfs = false;

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                    b"numFmts" => in_num_fmts = true,
                    b"cellXfs" => in_cell_xfs = true,
                    b"xf" if in_cell_xfs => styles.cell_xfs.push(num_fmt_id_attr(e).unwrap_or(0)),
                    b"numFmt" if in_num_fmts => styles.push_num_fmt(e),
                    _ => {}
                },
                Ok(Event::Empty(ref e)) => match e.local_name().as_ref() {
                    b"numFmt" if in_num_fmts => styles.push_num_fmt(e),
                    b"xf" if in_cell_xfs => styles.cell_xfs.push(num_fmt_id_attr(e).unwrap_or(0)),
                    _ => {}
                },
                Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                    b"numFmts" => in_num_fmts = false,
                    b"cellXfs" => in_cell_xfs = false,
                    _ => {}
                },
                Ok(Event::Eof) => break,
                Err(e) => {
                    tracing::warn!("styles.xml parse stopped early: {}", e);
                    break;
                }
                _ => {}
            }
            buf.clear();
        }

        styles
    }

    fn push_num_fmt(&mut self, e: &BytesStart<'_>) {
        let mut num_fmt_id: Option<u32> = None;
        let mut format_code = String::new();
        for attr in e.attributes().flatten() {
            match attr.key.as_ref() {
                b"numFmtId" => {
                    num_fmt_id = String::from_utf8_lossy(&attr.value).parse().ok();
                }
                b"formatCode" => {
                    format_code = attr
                        .unescape_value()
                        .map(|v| v.into_owned())
                        .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned());
                }
                _ => {}
            }
        }
        if let Some(id) = num_fmt_id {
            self.num_fmts.insert(id, format_code);
        }
    }

    /// Get the numFmtId for a cell style index.
    pub fn num_fmt_id(&self, style_index: usize) -> Option<u32> {
        self.cell_xfs.get(style_index).copied()
    }

    /// Custom format code of a numFmtId.
    pub fn format_code(&self, num_fmt_id: u32) -> Option<&str> {
        self.num_fmts.get(&num_fmt_id).map(|s| s.as_str())
    }

    /// Check if a numFmtId represents a date format.
    pub fn is_date_format(&self, num_fmt_id: u32) -> bool {
        if is_builtin_date_format(num_fmt_id) {
            return true;
        }

        self.format_code(num_fmt_id)
            .is_some_and(Self::is_date_format_code)
    }

    /// Check if a format code string represents a date format.
    ///
    /// Patterns inside square brackets (`[Red]`) or quotes are ignored.
    pub(crate) fn is_date_format_code(format_code: &str) -> bool {
        let mut in_bracket = false;
        let mut in_quote = false;
        let mut prev_char = '\0';
        let lower_format = format_code.to_lowercase();

        for c in format_code.chars() {
            match c {
                '[' if !in_quote => in_bracket = true,
                ']' if !in_quote => in_bracket = false,
                '"' => in_quote = !in_quote,
                _ if !in_bracket && !in_quote => match c.to_ascii_lowercase() {
                    'd' | 'y' => return true,
                    // 'm' is a month next to d/y, otherwise minutes
                    'm' => {
                        let lower_prev = prev_char.to_ascii_lowercase();
                        if lower_prev == 'd' || lower_prev == 'y' {
                            return true;
                        }
                        if lower_format.contains('d') || lower_format.contains('y') {
                            return true;
                        }
                    }
                    _ => {}
                },
                _ => {}
            }
            prev_char = c;
        }

        false
    }
}

fn num_fmt_id_attr(e: &BytesStart<'_>) -> Option<u32> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == b"numFmtId")
        .and_then(|attr| String::from_utf8_lossy(&attr.value).parse().ok())
}
