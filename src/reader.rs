//! Workbook readers and the sheet event surface they drive.
//!
//! Both encodings present a sheet to callers the same way: a
//! [`SheetHandler`] receives `begin_sheet`, then `begin_row` / `cell` /
//! `end_row` for each row, then `end_sheet`. Only cells of rows in the
//! handler's [`RowWindow`] (plus its title row) are delivered.

use crate::coerce;
use crate::detect::{detect_format_from_path, FormatType};
use crate::error::{Error, Result};
use crate::schema::RowWindow;
use crate::value::{CellData, CellEvent, Value};
use std::collections::{BTreeMap, HashMap};
use std::io::{Read, Seek};
use std::path::Path;

/// Receiver of sheet events.
pub trait SheetHandler {
    /// Rows whose cells should be delivered.
    fn window(&self) -> RowWindow;

    /// Called once before any row with the sheet's name.
    fn begin_sheet(&mut self, _name: &str) -> Result<()> {
        Ok(())
    }

    /// A row starts.
    fn begin_row(&mut self, row: usize) -> Result<()>;

    /// A cell of a wanted row.
    fn cell(&mut self, event: CellEvent) -> Result<()>;

    /// The current row ends.
    fn end_row(&mut self, row: usize) -> Result<()>;

    /// The sheet ends, naturally or because the window end was passed.
    fn end_sheet(&mut self) -> Result<()>;
}

/// Sheet selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetSelector {
    /// Zero-based position in the workbook
    Index(usize),
    /// Sheet name
    Name(String),
}

impl SheetSelector {
    /// Resolve against the workbook's sheet names.
    pub fn resolve(&self, names: &[String]) -> Result<usize> {
        match self {
            SheetSelector::Index(idx) if *idx < names.len() => Ok(*idx),
            SheetSelector::Index(idx) => Err(Error::SheetNotFound(format!("#{}", idx))),
            SheetSelector::Name(name) => names
                .iter()
                .position(|n| n == name)
                .ok_or_else(|| Error::SheetNotFound(name.clone())),
        }
    }
}

impl From<usize> for SheetSelector {
    fn from(idx: usize) -> Self {
        SheetSelector::Index(idx)
    }
}

impl From<&str> for SheetSelector {
    fn from(name: &str) -> Self {
        SheetSelector::Name(name.to_string())
    }
}

/// Address of one cell for coordinate reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellCoord {
    pub sheet: SheetSelector,
    /// Zero-based row
    pub row: usize,
    /// Zero-based column
    pub column: usize,
}

impl CellCoord {
    /// Create a coordinate.
    pub fn new(sheet: impl Into<SheetSelector>, row: usize, column: usize) -> Self {
        Self {
            sheet: sheet.into(),
            row,
            column,
        }
    }
}

/// A workbook opened for reading.
pub trait WorkbookReader {
    /// Encoding of the workbook.
    fn format(&self) -> FormatType;

    /// Sheet names in workbook order.
    fn sheet_names(&self) -> Vec<String>;

    /// Drive `handler` over one sheet.
    fn read_sheet(&mut self, sheet: &SheetSelector, handler: &mut dyn SheetHandler) -> Result<()>;

    /// Check if a numeric format id denotes a date.
    fn is_date_format(&self, format_id: u32) -> bool;

    /// Drive each handler over the sheet at the same position.
    fn read_sheets(&mut self, handlers: &mut [&mut dyn SheetHandler]) -> Result<()> {
        for (idx, handler) in handlers.iter_mut().enumerate() {
            self.read_sheet(&SheetSelector::Index(idx), &mut **handler)?;
        }
        Ok(())
    }

    /// Resolve individual cells to scalar values.
    ///
    /// Each referenced sheet is loaded completely, so this is not suited to
    /// very large documents.
    fn read_cells(&mut self, coords: &[CellCoord]) -> Result<Vec<Option<Value>>> {
        let names = self.sheet_names();
        let mut grids: HashMap<usize, GridCollector> = HashMap::new();

        for coord in coords {
            let idx = coord.sheet.resolve(&names)?;
            if !grids.contains_key(&idx) {
                let mut grid = GridCollector::default();
                self.read_sheet(&SheetSelector::Index(idx), &mut grid)?;
                grids.insert(idx, grid);
            }
        }

        let mut values = Vec::with_capacity(coords.len());
        for coord in coords {
            let idx = coord.sheet.resolve(&names)?;
            let value = grids
                .get(&idx)
                .and_then(|grid| grid.cells.get(&(coord.row, coord.column)))
                .and_then(|(data, format_id)| self.resolve_value(data, *format_id));
            values.push(value);
        }
        Ok(values)
    }

    /// Best-effort scalar for a raw cell.
    fn resolve_value(&self, data: &CellData, format_id: Option<u32>) -> Option<Value> {
        match data {
            CellData::Empty => None,
            CellData::Text(text) => Some(Value::Text(text.clone())),
            CellData::Bool(b) => Some(Value::Bool(*b)),
            CellData::Number(text) => match format_id {
                Some(id) if self.is_date_format(id) => text
                    .parse::<f64>()
                    .ok()
                    .and_then(coerce::date::serial_to_datetime)
                    .map(Value::Date),
                // Magnitudes beyond the decimal range stay floating point
                _ => coerce::parse_decimal(text)
                    .map(Value::Decimal)
                    .or_else(|| coerce::parse_float(text).map(Value::Float)),
            },
        }
    }
}

/// Collects every cell of a sheet.
#[derive(Debug, Default)]
struct GridCollector {
    cells: BTreeMap<(usize, usize), (CellData, Option<u32>)>,
}

impl SheetHandler for GridCollector {
    fn window(&self) -> RowWindow {
        RowWindow::all()
    }

    fn begin_row(&mut self, _row: usize) -> Result<()> {
        Ok(())
    }

    fn cell(&mut self, event: CellEvent) -> Result<()> {
        self.cells
            .insert((event.row, event.column), (event.data, event.format_id));
        Ok(())
    }

    fn end_row(&mut self, _row: usize) -> Result<()> {
        Ok(())
    }

    fn end_sheet(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Open a workbook file, choosing the reader by its suffix.
///
/// # Example
///
/// ```no_run
/// use sheetbind::{open_workbook, SheetSelector};
///
/// let workbook = open_workbook("data.xlsx")?;
/// println!("{:?}", workbook.sheet_names());
/// # Ok::<(), sheetbind::Error>(())
/// ```
pub fn open_workbook(path: impl AsRef<Path>) -> Result<Box<dyn WorkbookReader>> {
    let path = path.as_ref();
    match detect_format_from_path(path)? {
        #[cfg(feature = "xlsx")]
        FormatType::Xlsx => Ok(Box::new(crate::xlsx::XlsxReader::open(path)?)),
        #[cfg(feature = "xls")]
        FormatType::Xls => Ok(Box::new(crate::xls::XlsReader::open(path)?)),
        #[allow(unreachable_patterns)]
        other => Err(Error::UnsupportedFormat(other.to_string())),
    }
}

/// Open a workbook from a seekable stream with an explicit format.
pub fn open_workbook_from_reader<R: Read + Seek + 'static>(
    reader: R,
    format: FormatType,
) -> Result<Box<dyn WorkbookReader>> {
    match format {
        #[cfg(feature = "xlsx")]
        FormatType::Xlsx => Ok(Box::new(crate::xlsx::XlsxReader::from_reader(reader)?)),
        #[cfg(feature = "xls")]
        FormatType::Xls => Ok(Box::new(crate::xls::XlsReader::from_reader(reader)?)),
        #[allow(unreachable_patterns)]
        other => {
            drop(reader);
            Err(Error::UnsupportedFormat(other.to_string()))
        }
    }
}
