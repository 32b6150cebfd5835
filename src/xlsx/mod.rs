//! Zipped-XML (.xlsx) spreadsheet support.
//!
//! Reading streams each worksheet through [`parser::SheetParser`], resolving
//! shared strings and number formats loaded once per workbook. Writing goes
//! through [`XlsxWriter`], which produces one sheet per [`RowSource`].
//!
//! # Example
//!
//! ```no_run
//! use sheetbind::xlsx::XlsxReader;
//! use sheetbind::WorkbookReader;
//!
//! let reader = XlsxReader::open("spreadsheet.xlsx")?;
//! for name in reader.sheet_names() {
//!     println!("Sheet: {}", name);
//! }
//! # Ok::<(), sheetbind::Error>(())
//! ```

pub mod parser;
mod reader;
mod shared_strings;
mod style_sheet;
pub(crate) mod styles;
mod workbook;
mod writer;

pub use parser::{parse_sheet, Flow, SheetParser};
pub use reader::XlsxReader;
pub use shared_strings::SharedStrings;
pub use style_sheet::{CellStyle, StyleRegistry};
pub use styles::Styles;
pub use workbook::SheetInfo;
pub use writer::{write_xlsx, CachePolicy, RowSource, SheetStats, XlsxWriter};
