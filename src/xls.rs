//! Legacy binary (.xls) workbook reader.
//!
//! Decoding is delegated to `calamine`; the decoded sheet is replayed as
//! the same event sequence the XLSX parser produces, so handlers do not
//! need to know which encoding they are reading.

use crate::coerce::date::is_builtin_date_format;
use crate::container::ReadSeek;
use crate::detect::FormatType;
use crate::error::{Error, Result};
use crate::reader::{SheetHandler, SheetSelector, WorkbookReader};
use crate::value::{CellData, CellEvent};
use calamine::{Data, Range, Reader, Xls};
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

/// Format id reported for date-time cells; the built-in `m/d/yyyy` format.
const DATE_FORMAT_ID: u32 = 14;

/// Reader for legacy binary (.xls) workbooks.
pub struct XlsReader {
    workbook: Xls<Box<dyn ReadSeek>>,
    sheet_names: Vec<String>,
}

impl XlsReader {
    /// Open an XLS file for reading.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::debug!(path = %path.display(), "opening xls workbook");
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    /// Create a reader from bytes.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Self::from_reader(std::io::Cursor::new(data))
    }

    /// Create a reader from any seekable stream.
    pub fn from_reader<R: Read + Seek + 'static>(reader: R) -> Result<Self> {
        let boxed: Box<dyn ReadSeek> = Box::new(reader);
        let workbook = Xls::new(boxed)?;
        let sheet_names = workbook.sheet_names();
        tracing::debug!(sheets = sheet_names.len(), "loaded xls workbook");
        Ok(Self {
            workbook,
            sheet_names,
        })
    }
}

impl WorkbookReader for XlsReader {
    fn format(&self) -> FormatType {
        FormatType::Xls
    }

    fn sheet_names(&self) -> Vec<String> {
        self.sheet_names.clone()
    }

    fn read_sheet(&mut self, sheet: &SheetSelector, handler: &mut dyn SheetHandler) -> Result<()> {
        let idx = sheet.resolve(&self.sheet_names)?;
        let name = &self.sheet_names[idx];
        tracing::debug!(sheet = %name, "reading sheet");

        let range = self
            .workbook
            .worksheet_range(name)
            .map_err(|e| Error::Legacy(format!("sheet '{}': {}", name, e)))?;

        replay(&range, name, handler)
    }

    fn is_date_format(&self, format_id: u32) -> bool {
        is_builtin_date_format(format_id)
    }
}

/// Replay a decoded sheet as row and cell events.
///
/// Positions are shifted by the range origin, so events carry the same
/// absolute coordinates as in the workbook.
fn replay(range: &Range<Data>, name: &str, handler: &mut dyn SheetHandler) -> Result<()> {
    handler.begin_sheet(name)?;
    let window = handler.window();
    let (first_row, first_column) = range.start().unwrap_or((0, 0));

    for (offset, cells) in range.rows().enumerate() {
        // Rows without any value are not stored in the binary format
        if cells.iter().all(|c| matches!(c, Data::Empty)) {
            continue;
        }

        let row = first_row as usize + offset;
        if window.is_past_end(row) {
            tracing::debug!(sheet = %name, row, "row window exhausted, stopping early");
            break;
        }

        handler.begin_row(row)?;
        if window.wants(row) {
            for (col_offset, cell) in cells.iter().enumerate() {
                let Some((data, format_id)) = cell_data(cell) else {
                    continue;
                };
                handler.cell(CellEvent {
                    row,
                    column: first_column as usize + col_offset,
                    format_id,
                    data,
                })?;
            }
        }
        handler.end_row(row)?;
    }

    handler.end_sheet()
}

/// Raw cell content and format id of a decoded cell; `None` for empty cells.
fn cell_data(cell: &Data) -> Option<(CellData, Option<u32>)> {
    let converted = match cell {
        Data::Empty => return None,
        Data::String(s) => (CellData::Text(s.clone()), None),
        Data::Float(n) => (CellData::Number(n.to_string()), Some(0)),
        Data::Int(n) => (CellData::Number(n.to_string()), Some(0)),
        Data::Bool(b) => (CellData::Bool(*b), None),
        Data::DateTime(dt) => (CellData::Number(dt.as_f64().to_string()), Some(DATE_FORMAT_ID)),
        Data::DateTimeIso(s) | Data::DurationIso(s) => (CellData::Text(s.clone()), None),
        Data::Error(e) => (CellData::Text(e.to_string()), None),
    };
    Some(converted)
}

impl std::fmt::Debug for XlsReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XlsReader")
            .field("sheets", &self.sheet_names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::{Binding, Field, Record};
    use crate::schema::{ColumnSchema, MatchBy, RowWindow, SheetSchema, SheetSchemaParams};
    use calamine::{ExcelDateTime, ExcelDateTimeType};
    use pretty_assertions::assert_eq;

    #[derive(Debug, PartialEq)]
    enum Seen {
        Sheet(String),
        Row(usize),
        Cell(usize, usize, Option<u32>),
        RowEnd(usize),
        SheetEnd,
    }

    struct Trace {
        window: RowWindow,
        events: Vec<Seen>,
    }

    impl SheetHandler for Trace {
        fn window(&self) -> RowWindow {
            self.window
        }

        fn begin_sheet(&mut self, name: &str) -> Result<()> {
            self.events.push(Seen::Sheet(name.to_string()));
            Ok(())
        }

        fn begin_row(&mut self, row: usize) -> Result<()> {
            self.events.push(Seen::Row(row));
            Ok(())
        }

        fn cell(&mut self, event: CellEvent) -> Result<()> {
            self.events.push(Seen::Cell(event.row, event.column, event.format_id));
            Ok(())
        }

        fn end_row(&mut self, row: usize) -> Result<()> {
            self.events.push(Seen::RowEnd(row));
            Ok(())
        }

        fn end_sheet(&mut self) -> Result<()> {
            self.events.push(Seen::SheetEnd);
            Ok(())
        }
    }

    /// Rows 2..=6 and columns B..=D; header on row 2, row 4 left empty.
    fn scores() -> Range<Data> {
        let mut range = Range::new((2, 1), (6, 3));
        range.set_value((2, 1), Data::String("Name".into()));
        range.set_value((2, 2), Data::String("Score".into()));
        range.set_value((3, 1), Data::String("a".into()));
        range.set_value((3, 2), Data::Float(1.5));
        range.set_value((5, 1), Data::String("c".into()));
        range.set_value(
            (5, 3),
            Data::DateTime(ExcelDateTime::new(45000.5, ExcelDateTimeType::DateTime, false)),
        );
        range.set_value((6, 1), Data::String("d".into()));
        range.set_value((6, 2), Data::Int(4));
        range
    }

    /// A single decoded sheet behind the workbook interface.
    struct RangeWorkbook(Range<Data>);

    impl WorkbookReader for RangeWorkbook {
        fn format(&self) -> FormatType {
            FormatType::Xls
        }

        fn sheet_names(&self) -> Vec<String> {
            vec!["Scores".to_string()]
        }

        fn read_sheet(&mut self, sheet: &SheetSelector, handler: &mut dyn SheetHandler) -> Result<()> {
            sheet.resolve(&self.sheet_names())?;
            replay(&self.0, "Scores", handler)
        }

        fn is_date_format(&self, format_id: u32) -> bool {
            is_builtin_date_format(format_id)
        }
    }

    #[test]
    fn test_replay_offsets_and_window() {
        let mut trace = Trace {
            window: RowWindow {
                title_row: Some(2),
                start: 3,
                end: Some(5),
            },
            events: Vec::new(),
        };
        replay(&scores(), "Scores", &mut trace).unwrap();

        assert_eq!(
            trace.events,
            vec![
                Seen::Sheet("Scores".into()),
                Seen::Row(2),
                Seen::Cell(2, 1, None),
                Seen::Cell(2, 2, None),
                Seen::RowEnd(2),
                Seen::Row(3),
                Seen::Cell(3, 1, None),
                Seen::Cell(3, 2, Some(0)),
                Seen::RowEnd(3),
                Seen::Row(5),
                Seen::Cell(5, 1, None),
                Seen::Cell(5, 3, Some(DATE_FORMAT_ID)),
                Seen::RowEnd(5),
                Seen::SheetEnd,
            ]
        );
    }

    #[test]
    fn test_replay_announces_rows_outside_window() {
        let mut trace = Trace {
            window: RowWindow {
                title_row: None,
                start: 6,
                end: None,
            },
            events: Vec::new(),
        };
        replay(&scores(), "Scores", &mut trace).unwrap();

        let cells: Vec<&Seen> = trace
            .events
            .iter()
            .filter(|e| matches!(e, Seen::Cell(..)))
            .collect();
        assert_eq!(cells, vec![&Seen::Cell(6, 1, None), &Seen::Cell(6, 2, Some(0))]);
        assert!(trace.events.contains(&Seen::Row(2)));
        assert!(!trace.events.contains(&Seen::Row(4)));
        assert_eq!(trace.events.last(), Some(&Seen::SheetEnd));
    }

    #[test]
    fn test_empty_range_replays_empty_sheet() {
        let mut trace = Trace {
            window: RowWindow::all(),
            events: Vec::new(),
        };
        replay(&Range::empty(), "Blank", &mut trace).unwrap();
        assert_eq!(trace.events, vec![Seen::Sheet("Blank".into()), Seen::SheetEnd]);
    }

    #[test]
    fn test_records_from_legacy_sheet() {
        #[derive(Debug, Default, PartialEq)]
        struct Score {
            name: String,
            score: Option<f64>,
        }

        impl Record for Score {
            fn fields() -> Vec<Field<Self>> {
                vec![
                    Field::new("name", |s: &Score| &s.name, |s, v| s.name = v),
                    Field::new("score", |s: &Score| &s.score, |s, v| s.score = v),
                ]
            }
        }

        let params = SheetSchemaParams::default()
            .with_match_by(MatchBy::Title)
            .with_title_row(2)
            .with_data_rows(3, -1);
        let schema = SheetSchema::builder(params)
            .column("name", ColumnSchema::new(0, "Name"))
            .column("score", ColumnSchema::new(1, "Score"))
            .build()
            .unwrap();
        let binding = Binding::<Score>::for_record(schema).unwrap();

        let mut workbook = RangeWorkbook(scores());
        let records = binding
            .read_all(&mut workbook, SheetSelector::Index(0))
            .unwrap();
        assert_eq!(
            records,
            vec![
                Score {
                    name: "a".into(),
                    score: Some(1.5),
                },
                Score {
                    name: "c".into(),
                    score: None,
                },
                Score {
                    name: "d".into(),
                    score: Some(4.0),
                },
            ]
        );
    }

    #[test]
    fn test_datetime_cells_carry_date_format() {
        let cell = Data::DateTime(ExcelDateTime::new(45000.5, ExcelDateTimeType::DateTime, false));
        let (data, format_id) = cell_data(&cell).unwrap();
        assert_eq!(data, CellData::Number("45000.5".into()));
        assert_eq!(format_id, Some(DATE_FORMAT_ID));
        assert!(is_builtin_date_format(DATE_FORMAT_ID));
    }

    #[test]
    fn test_cell_data_mapping() {
        assert_eq!(cell_data(&Data::Empty), None);
        assert_eq!(
            cell_data(&Data::Float(1.0)),
            Some((CellData::Number("1".into()), Some(0)))
        );
        assert_eq!(
            cell_data(&Data::Float(2.25)),
            Some((CellData::Number("2.25".into()), Some(0)))
        );
        assert_eq!(
            cell_data(&Data::Int(-3)),
            Some((CellData::Number("-3".into()), Some(0)))
        );
        assert_eq!(cell_data(&Data::Bool(true)), Some((CellData::Bool(true), None)));
        assert_eq!(
            cell_data(&Data::String("x".into())),
            Some((CellData::Text("x".into()), None))
        );
    }

    #[test]
    fn test_garbage_is_rejected() {
        let err = XlsReader::from_bytes(vec![0u8; 64]).unwrap_err();
        assert!(matches!(err, Error::Legacy(_)));
    }
}
