//! Error types for the sheetbind library.

use std::io;
use thiserror::Error;

/// Result type alias for sheetbind operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while reading or writing workbooks.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The file format could not be determined.
    #[error("Unknown file format")]
    UnknownFormat,

    /// The file format is recognized but not supported for this operation.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Error reading or writing the ZIP archive.
    #[error("ZIP archive error: {0}")]
    ZipArchive(String),

    /// Error parsing XML content.
    #[error("XML parse error: {0}")]
    XmlParse(String),

    /// Error reported by the legacy workbook reader.
    #[error("Legacy workbook error: {0}")]
    Legacy(String),

    /// Invalid or malformed data in the document.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// A required document component is missing.
    #[error("Missing component: {0}")]
    MissingComponent(String),

    /// The requested sheet does not exist.
    #[error("Sheet not found: {0}")]
    SheetNotFound(String),

    /// The sheet schema or field binding is inconsistent.
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// A row or cell address in the sheet could not be decoded.
    #[error("Invalid reference '{reference}' in sheet '{sheet}'")]
    InvalidReference { sheet: String, reference: String },

    /// A cell referenced a shared string that does not exist.
    #[error("Shared string index '{index}' out of range ({count} strings) in sheet '{sheet}'")]
    SharedStringIndex {
        sheet: String,
        index: String,
        count: usize,
    },

    /// A coerced value could not be stored into a record field.
    #[error("Cannot assign field '{field}' at sheet '{sheet}', row {row}, column {column}: {message}")]
    FieldAssignment {
        sheet: String,
        row: usize,
        column: String,
        field: String,
        message: String,
    },

    /// A writer was driven out of order.
    #[error("Invalid writer state: {0}")]
    InvalidState(String),
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        Error::ZipArchive(err.to_string())
    }
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Error::XmlParse(err.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for Error {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        Error::XmlParse(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidSchema(err.to_string())
    }
}

#[cfg(feature = "xls")]
impl From<calamine::XlsError> for Error {
    fn from(err: calamine::XlsError) -> Self {
        Error::Legacy(err.to_string())
    }
}
