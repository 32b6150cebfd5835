//! Streaming worksheet parser.
//!
//! Worksheet XML is consumed as a forward-only stream of `quick-xml` events.
//! The parser keeps only the state of the row and cell currently open, so
//! memory use does not grow with the size of the sheet.

use crate::column::split_cell_reference;
use crate::error::{Error, Result};
use crate::reader::SheetHandler;
use crate::schema::RowWindow;
use crate::value::{CellData, CellEvent};
use quick_xml::events::{BytesStart, Event};
use std::io::BufRead;

use super::shared_strings::SharedStrings;
use super::styles::Styles;

/// Whether the driving loop should keep feeding events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// The row window is exhausted; the sheet has already been closed.
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    BeforeRow,
    InRow,
    InCell,
    AfterSheet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CellKind {
    Shared,
    Bool,
    Text,
    Numeric,
}

impl CellKind {
    fn from_type_attr(t: Option<&[u8]>) -> Self {
        match t {
            Some(b"s") => CellKind::Shared,
            Some(b"b") => CellKind::Bool,
            Some(b"str") | Some(b"inlineStr") | Some(b"e") | Some(b"d") => CellKind::Text,
            _ => CellKind::Numeric,
        }
    }
}

#[derive(Debug)]
struct PendingCell {
    column: usize,
    kind: CellKind,
    format_id: Option<u32>,
}

/// Per-sheet parse state.
///
/// Shared strings and styles are borrowed from the workbook and never
/// modified while a sheet is parsed.
pub struct SheetParser<'a> {
    sheet: &'a str,
    shared_strings: &'a SharedStrings,
    styles: &'a Styles,
    window: RowWindow,
    state: State,
    row: Option<usize>,
    cell: Option<PendingCell>,
    text: String,
    capture: bool,
    in_phonetic: bool,
}

impl<'a> SheetParser<'a> {
    /// Create a parser for one sheet.
    pub fn new(
        sheet: &'a str,
        shared_strings: &'a SharedStrings,
        styles: &'a Styles,
        window: RowWindow,
    ) -> Self {
        Self {
            sheet,
            shared_strings,
            styles,
            window,
            state: State::BeforeRow,
            row: None,
            cell: None,
            text: String::new(),
            capture: false,
            in_phonetic: false,
        }
    }

    /// Feed one XML event.
    pub fn on_event(&mut self, event: &Event<'_>, handler: &mut dyn SheetHandler) -> Result<Flow> {
        if self.state == State::AfterSheet {
            return Ok(Flow::Stop);
        }

        match event {
            Event::Start(e) => match e.local_name().as_ref() {
                b"row" => return self.open_row(e, handler),
                b"c" => self.open_cell(e)?,
                b"rPh" => self.in_phonetic = true,
                b"v" | b"t" if self.state == State::InCell && !self.in_phonetic => {
                    self.capture = true
                }
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"row" => {
                    if self.open_row(e, handler)? == Flow::Stop {
                        return Ok(Flow::Stop);
                    }
                    self.close_row(handler)?;
                }
                b"c" => {
                    self.open_cell(e)?;
                    self.close_cell(handler)?;
                }
                _ => {}
            },
            Event::Text(e) if self.capture => {
                self.text.push_str(&e.unescape()?);
            }
            Event::CData(e) if self.capture => {
                self.text.push_str(&String::from_utf8_lossy(e));
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"row" => self.close_row(handler)?,
                b"c" => self.close_cell(handler)?,
                b"v" | b"t" => self.capture = false,
                b"rPh" => self.in_phonetic = false,
                _ => {}
            },
            _ => {}
        }

        Ok(Flow::Continue)
    }

    /// End of stream: close any open row and the sheet.
    pub fn finish(&mut self, handler: &mut dyn SheetHandler) -> Result<()> {
        if self.state == State::AfterSheet {
            return Ok(());
        }
        self.cell = None;
        self.close_row(handler)?;
        self.state = State::AfterSheet;
        handler.end_sheet()
    }

    fn open_row(&mut self, e: &BytesStart<'_>, handler: &mut dyn SheetHandler) -> Result<Flow> {
        let raw = attr_value(e, b"r");
        let row = raw
            .as_deref()
            .and_then(|r| r.trim().parse::<usize>().ok())
            .filter(|&r| r > 0)
            .map(|r| r - 1)
            .ok_or_else(|| self.invalid_reference(raw.as_deref()))?;

        // Rows are never nested; a still-open row means a missing end tag
        self.close_row(handler)?;

        if self.window.is_past_end(row) {
            tracing::debug!(sheet = self.sheet, row, "row window exhausted, stopping early");
            self.finish(handler)?;
            return Ok(Flow::Stop);
        }

        handler.begin_row(row)?;
        self.row = Some(row);
        self.state = State::InRow;
        Ok(Flow::Continue)
    }

    fn close_row(&mut self, handler: &mut dyn SheetHandler) -> Result<()> {
        if let Some(row) = self.row.take() {
            handler.end_row(row)?;
        }
        self.state = State::BeforeRow;
        Ok(())
    }

    fn open_cell(&mut self, e: &BytesStart<'_>) -> Result<()> {
        if self.row.is_none() {
            return Err(Error::InvalidData(format!(
                "cell outside of a row in sheet '{}'",
                self.sheet
            )));
        }

        let mut reference = None;
        let mut cell_type = None;
        let mut style = None;
        for attr in e.attributes() {
            let attr = attr?;
            match attr.key.as_ref() {
                b"r" => reference = Some(String::from_utf8_lossy(&attr.value).into_owned()),
                b"t" => cell_type = Some(attr.value.into_owned()),
                b"s" => style = String::from_utf8_lossy(&attr.value).trim().parse::<usize>().ok(),
                _ => {}
            }
        }

        let (column, _) = reference
            .as_deref()
            .and_then(split_cell_reference)
            .ok_or_else(|| self.invalid_reference(reference.as_deref()))?;

        let kind = CellKind::from_type_attr(cell_type.as_deref());
        let format_id = match kind {
            CellKind::Numeric => Some(self.styles.num_fmt_id(style.unwrap_or(0)).unwrap_or(0)),
            _ => None,
        };

        self.cell = Some(PendingCell {
            column,
            kind,
            format_id,
        });
        self.text.clear();
        self.capture = false;
        self.state = State::InCell;
        Ok(())
    }

    fn close_cell(&mut self, handler: &mut dyn SheetHandler) -> Result<()> {
        self.capture = false;
        let (Some(cell), Some(row)) = (self.cell.take(), self.row) else {
            return Ok(());
        };
        self.state = State::InRow;

        let wanted = self.window.wants(row);
        let data = match cell.kind {
            _ if self.text.is_empty() => CellData::Empty,
            // Indices are validated even in rows that are not emitted
            CellKind::Shared => {
                let resolved = self.resolve_shared_string()?;
                if wanted {
                    CellData::Text(resolved.to_string())
                } else {
                    CellData::Empty
                }
            }
            CellKind::Bool => match self.text.trim() {
                "1" | "true" | "TRUE" => CellData::Bool(true),
                "0" | "false" | "FALSE" => CellData::Bool(false),
                _ => CellData::Text(self.text.clone()),
            },
            CellKind::Text => CellData::Text(self.text.clone()),
            CellKind::Numeric => CellData::Number(self.text.trim().to_string()),
        };

        if wanted {
            handler.cell(CellEvent {
                row,
                column: cell.column,
                format_id: cell.format_id,
                data,
            })?;
        }
        Ok(())
    }

    fn resolve_shared_string(&self) -> Result<&'a str> {
        let index = self.text.trim();
        index
            .parse::<usize>()
            .ok()
            .and_then(|idx| self.shared_strings.get(idx))
            .ok_or_else(|| Error::SharedStringIndex {
                sheet: self.sheet.to_string(),
                index: index.to_string(),
                count: self.shared_strings.len(),
            })
    }

    fn invalid_reference(&self, reference: Option<&str>) -> Error {
        Error::InvalidReference {
            sheet: self.sheet.to_string(),
            reference: reference.unwrap_or("<missing>").to_string(),
        }
    }
}

fn attr_value(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == key)
        .map(|attr| String::from_utf8_lossy(&attr.value).into_owned())
}

/// Parse one worksheet stream, driving `handler`.
///
/// Reading stops as soon as a row beyond the handler's window appears, so
/// bounded reads of large sheets do not scan the rest of the stream.
pub fn parse_sheet<R: BufRead>(
    source: R,
    sheet: &str,
    shared_strings: &SharedStrings,
    styles: &Styles,
    handler: &mut dyn SheetHandler,
) -> Result<()> {
    handler.begin_sheet(sheet)?;

    let mut parser = SheetParser::new(sheet, shared_strings, styles, handler.window());
    let mut reader = quick_xml::Reader::from_reader(source);
    let mut buf = Vec::new();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| Error::XmlParse(format!("sheet '{}': {}", sheet, e)))?;
        if matches!(event, Event::Eof) {
            parser.finish(handler)?;
            break;
        }
        if parser.on_event(&event, handler)? == Flow::Stop {
            break;
        }
        buf.clear();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Records every callback as a line of text.
    struct Recorder {
        window: RowWindow,
        log: Vec<String>,
    }

    impl Recorder {
        fn new(window: RowWindow) -> Self {
            Self {
                window,
                log: Vec::new(),
            }
        }
    }

    impl SheetHandler for Recorder {
        fn window(&self) -> RowWindow {
            self.window
        }

        fn begin_sheet(&mut self, name: &str) -> Result<()> {
            self.log.push(format!("sheet {}", name));
            Ok(())
        }

        fn begin_row(&mut self, row: usize) -> Result<()> {
            self.log.push(format!("row {}", row));
            Ok(())
        }

        fn cell(&mut self, event: CellEvent) -> Result<()> {
            self.log.push(format!(
                "cell {},{} {:?} {:?}",
                event.row, event.column, event.format_id, event.data
            ));
            Ok(())
        }

        fn end_row(&mut self, row: usize) -> Result<()> {
            self.log.push(format!("end {}", row));
            Ok(())
        }

        fn end_sheet(&mut self) -> Result<()> {
            self.log.push("end sheet".to_string());
            Ok(())
        }
    }

    fn shared() -> SharedStrings {
        SharedStrings::parse("<sst><si><t>Name</t></si><si><t>Ann</t></si></sst>".as_bytes())
            .unwrap()
    }

    fn sheet_xml(rows: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>{}</sheetData></worksheet>"#,
            rows
        )
    }

    fn run(xml: &str, styles: &Styles, window: RowWindow) -> Result<Vec<String>> {
        let mut recorder = Recorder::new(window);
        parse_sheet(xml.as_bytes(), "S", &shared(), styles, &mut recorder)?;
        Ok(recorder.log)
    }

    #[test]
    fn test_cell_types() {
        let styles = Styles::parse(
            r#"<styleSheet><cellXfs><xf numFmtId="0"/><xf numFmtId="14"/></cellXfs></styleSheet>"#,
        );
        let xml = sheet_xml(
            r#"<row r="1">
                 <c r="A1" t="s"><v>1</v></c>
                 <c r="B1"><v>42.5</v></c>
                 <c r="C1" s="1"><v>45000</v></c>
                 <c r="D1" t="b"><v>1</v></c>
                 <c r="E1" t="inlineStr"><is><r><t>in</t></r><r><t xml:space="preserve"> line</t></r></is></c>
                 <c r="F1" t="str"><f>A1&amp;"x"</f><v>Annx</v></c>
                 <c r="G1" s="1"/>
               </row>"#,
        );

        let log = run(&xml, &styles, RowWindow::all()).unwrap();
        assert_eq!(
            log,
            vec![
                "sheet S",
                "row 0",
                "cell 0,0 None Text(\"Ann\")",
                "cell 0,1 Some(0) Number(\"42.5\")",
                "cell 0,2 Some(14) Number(\"45000\")",
                "cell 0,3 None Bool(true)",
                "cell 0,4 None Text(\"in line\")",
                "cell 0,5 None Text(\"Annx\")",
                "cell 0,6 Some(14) Empty",
                "end 0",
                "end sheet",
            ]
        );
    }

    #[test]
    fn test_early_termination_ordering() {
        let rows: String = (1..=10)
            .map(|r| format!(r#"<row r="{r}"><c r="A{r}"><v>{r}</v></c></row>"#))
            .collect();
        let window = RowWindow {
            title_row: None,
            start: 2,
            end: Some(5),
        };

        let log = run(&sheet_xml(&rows), &Styles::default(), window).unwrap();
        let tail: Vec<&str> = log.iter().rev().take(2).map(String::as_str).collect();
        assert_eq!(tail, vec!["end sheet", "end 5"]);
        assert_eq!(log.iter().filter(|l| *l == "end sheet").count(), 1);
        assert!(!log.iter().any(|l| l.starts_with("row 6")));

        let cells: Vec<&String> = log.iter().filter(|l| l.starts_with("cell")).collect();
        assert_eq!(cells.len(), 4);
        assert!(cells[0].starts_with("cell 2,0"));
    }

    #[test]
    fn test_title_row_emitted_before_start() {
        let xml = sheet_xml(
            r#"<row r="1"><c r="A1" t="s"><v>0</v></c></row>
               <row r="2"><c r="A2"><v>1</v></c></row>
               <row r="3"><c r="A3"><v>2</v></c></row>"#,
        );
        let window = RowWindow {
            title_row: Some(0),
            start: 2,
            end: None,
        };

        let log = run(&xml, &Styles::default(), window).unwrap();
        let cells: Vec<&String> = log.iter().filter(|l| l.starts_with("cell")).collect();
        assert_eq!(cells.len(), 2);
        assert!(cells[0].contains("Name"));
        assert!(cells[1].starts_with("cell 2,0"));
        // Skipped rows still get row boundaries
        assert!(log.contains(&"row 1".to_string()));
    }

    #[test]
    fn test_empty_rows() {
        let xml = sheet_xml(r#"<row r="1"/><row r="3"><c r="B3"/></row>"#);
        let log = run(&xml, &Styles::default(), RowWindow::all()).unwrap();
        assert_eq!(
            log,
            vec![
                "sheet S",
                "row 0",
                "end 0",
                "row 2",
                "cell 2,1 Some(0) Empty",
                "end 2",
                "end sheet",
            ]
        );
    }

    #[test]
    fn test_missing_row_reference_is_fatal() {
        let xml = sheet_xml(r#"<row><c r="A1"><v>1</v></c></row>"#);
        let err = run(&xml, &Styles::default(), RowWindow::all()).unwrap_err();
        assert!(matches!(err, Error::InvalidReference { .. }));

        let xml = sheet_xml(r#"<row r="0"/>"#);
        assert!(run(&xml, &Styles::default(), RowWindow::all()).is_err());
    }

    #[test]
    fn test_malformed_cell_reference_is_fatal() {
        let xml = sheet_xml(r#"<row r="1"><c r="1A"><v>1</v></c></row>"#);
        let err = run(&xml, &Styles::default(), RowWindow::all()).unwrap_err();
        match err {
            Error::InvalidReference { sheet, reference } => {
                assert_eq!(sheet, "S");
                assert_eq!(reference, "1A");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_shared_string_out_of_range_in_skipped_row() {
        let xml = sheet_xml(r#"<row r="1"><c r="A1" t="s"><v>7</v></c></row>"#);
        let window = RowWindow {
            title_row: None,
            start: 5,
            end: None,
        };
        let err = run(&xml, &Styles::default(), window).unwrap_err();
        assert!(matches!(err, Error::SharedStringIndex { count: 2, .. }));
    }
}
