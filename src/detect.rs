//! Workbook format detection.
//!
//! Paths are classified by their suffix; raw byte streams either carry an
//! explicit [`FormatType`] or are sniffed by their magic bytes.

use crate::error::{Error, Result};
use std::path::Path;

/// ZIP file magic bytes: PK\x03\x04
const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

/// OLE compound document magic bytes used by legacy .xls files.
const OLE_MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// Supported workbook encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatType {
    /// Legacy binary workbook (.xls)
    Xls,
    /// Zipped-XML workbook (.xlsx)
    Xlsx,
}

impl FormatType {
    /// Returns the file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            FormatType::Xls => "xls",
            FormatType::Xlsx => "xlsx",
        }
    }

    /// Returns a human-readable name for this format.
    pub fn name(&self) -> &'static str {
        match self {
            FormatType::Xls => "Excel 97-2003 Workbook",
            FormatType::Xlsx => "Excel Workbook",
        }
    }
}

impl std::fmt::Display for FormatType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Detect the format from a path's suffix.
///
/// # Example
///
/// ```
/// use sheetbind::detect::{detect_format_from_path, FormatType};
///
/// assert_eq!(detect_format_from_path("report.XLSX")?, FormatType::Xlsx);
/// assert_eq!(detect_format_from_path("legacy.xls")?, FormatType::Xls);
/// # Ok::<(), sheetbind::Error>(())
/// ```
pub fn detect_format_from_path(path: impl AsRef<Path>) -> Result<FormatType> {
    let extension = path
        .as_ref()
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match extension.as_deref() {
        Some("xlsx") | Some("xlsm") => Ok(FormatType::Xlsx),
        Some("xls") => Ok(FormatType::Xls),
        Some(other) => Err(Error::UnsupportedFormat(format!(".{}", other))),
        None => Err(Error::UnknownFormat),
    }
}

/// Detect the format from the leading bytes of a document.
pub fn detect_format_from_bytes(data: &[u8]) -> Result<FormatType> {
    if is_zip_file(data) {
        Ok(FormatType::Xlsx)
    } else if data.starts_with(&OLE_MAGIC) {
        Ok(FormatType::Xls)
    } else {
        Err(Error::UnknownFormat)
    }
}

/// Check if data starts with ZIP magic bytes.
pub fn is_zip_file(data: &[u8]) -> bool {
    data.len() >= 4 && data[..4] == ZIP_MAGIC
}
