//! # sheetbind
//!
//! Schema-driven binding of Excel worksheets to typed records.
//!
//! Sheets are read as a stream of row and cell events, so large workbooks
//! can be decoded without loading them into memory, and written through a
//! writer that spills rows to a temporary file beyond a configurable size.
//!
//! ## Quick Start
//!
//! ```no_run
//! use sheetbind::{
//!     open_workbook, write_xlsx, Binding, ColumnSchema, Field, Record, SheetSchema,
//!     SheetSchemaParams, SheetSelector,
//! };
//!
//! #[derive(Default)]
//! struct Order {
//!     id: i64,
//!     customer: String,
//! }
//!
//! impl Record for Order {
//!     fn fields() -> Vec<Field<Self>> {
//!         vec![
//!             Field::new("id", |o: &Order| &o.id, |o, v| o.id = v),
//!             Field::new("customer", |o: &Order| &o.customer, |o, v| o.customer = v),
//!         ]
//!     }
//! }
//!
//! let schema = SheetSchema::builder(SheetSchemaParams::default().with_sheet_name("Orders"))
//!     .column("id", ColumnSchema::new(0, "ID"))
//!     .column("customer", ColumnSchema::new(1, "Customer"))
//!     .build()?;
//! let binding = Binding::<Order>::for_record(schema)?;
//!
//! // Read every data row of the first sheet
//! let mut workbook = open_workbook("orders.xlsx")?;
//! let orders = binding.read_all(workbook.as_mut(), SheetSelector::Index(0))?;
//!
//! // Write them back out
//! write_xlsx("copy.xlsx", |writer| binding.write_to(writer, &orders).map(|_| ()))?;
//! # Ok::<(), sheetbind::Error>(())
//! ```
//!
//! ## Features
//!
//! - `xlsx` (default): Office Open XML workbooks, read and write
//! - `xls` (default): legacy binary workbooks, read only
//!
//! Record binding and reading work with either format; encoding records
//! into sheets needs `xlsx`.

pub mod binder;
pub mod coerce;
pub mod column;
pub mod container;
pub mod detect;
pub mod error;
pub mod reader;
pub mod schema;
pub mod value;

#[cfg(feature = "xlsx")]
pub mod xlsx;

#[cfg(feature = "xls")]
pub mod xls;

// Re-exports
pub use binder::{
    Binding, DeclaredColumn, DynamicRecord, Field, FieldValue, Record, RecordReader,
    SchemaDocument,
};
pub use column::{cell_reference, column_index, column_letters, split_cell_reference};
pub use container::OoxmlContainer;
pub use detect::{detect_format_from_bytes, detect_format_from_path, FormatType};
pub use error::{Error, Result};
pub use reader::{
    open_workbook, open_workbook_from_reader, CellCoord, SheetHandler, SheetSelector,
    WorkbookReader,
};
pub use schema::{ColumnSchema, MatchBy, Rgb, RowWindow, SheetSchema, SheetSchemaParams};
pub use value::{CellData, CellEvent, CellOutput, CellType, ScalarKind, Value};

#[cfg(feature = "xlsx")]
pub use binder::RecordWriter;

#[cfg(feature = "xlsx")]
pub use xlsx::{write_xlsx, CachePolicy, RowSource, SheetStats, XlsxReader, XlsxWriter};

#[cfg(feature = "xls")]
pub use xls::XlsReader;
