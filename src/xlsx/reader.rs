//! XLSX workbook reader.

use crate::container::OoxmlContainer;
use crate::detect::FormatType;
use crate::error::{Error, Result};
use crate::reader::{SheetHandler, SheetSelector, WorkbookReader};
use std::io::{Read, Seek};
use std::path::Path;

use super::parser::parse_sheet;
use super::shared_strings::SharedStrings;
use super::styles::Styles;
use super::workbook::{read_sheets, SheetInfo, WORKBOOK_PATH};

const SHARED_STRINGS_PATH: &str = "xl/sharedStrings.xml";
const STYLES_PATH: &str = "xl/styles.xml";

/// Reader for zipped-XML (.xlsx) workbooks.
///
/// The shared string table and number formats are loaded once when the
/// workbook is opened; worksheets are streamed on demand.
///
/// # Example
///
/// ```no_run
/// use sheetbind::xlsx::XlsxReader;
/// use sheetbind::WorkbookReader;
///
/// let reader = XlsxReader::open("report.xlsx")?;
/// for name in reader.sheet_names() {
///     println!("{}", name);
/// }
/// # Ok::<(), sheetbind::Error>(())
/// ```
pub struct XlsxReader {
    container: OoxmlContainer,
    shared_strings: SharedStrings,
    styles: Styles,
    sheets: Vec<SheetInfo>,
}

impl XlsxReader {
    /// Open an XLSX file for reading.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::debug!(path = %path.display(), "opening xlsx workbook");
        let container = OoxmlContainer::open(path)?;
        Self::from_container(container)
    }

    /// Create a reader from bytes.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let container = OoxmlContainer::from_bytes(data)?;
        Self::from_container(container)
    }

    /// Create a reader from any seekable stream.
    pub fn from_reader<R: Read + Seek + 'static>(reader: R) -> Result<Self> {
        let container = OoxmlContainer::from_reader(reader)?;
        Self::from_container(container)
    }

    fn from_container(container: OoxmlContainer) -> Result<Self> {
        let shared_strings = if container.exists(SHARED_STRINGS_PATH) {
            container.with_entry(SHARED_STRINGS_PATH, |source| SharedStrings::parse(source))?
        } else {
            SharedStrings::default()
        };

        // Only an absent part falls back to General formats
        let styles = match container.read_xml(STYLES_PATH) {
            Ok(xml) => Styles::parse(&xml),
            Err(Error::MissingComponent(_)) => Styles::default(),
            Err(e) => return Err(e),
        };

        let sheets = read_sheets(&container)?;
        tracing::debug!(
            sheets = sheets.len(),
            shared_strings = shared_strings.len(),
            "loaded {}",
            WORKBOOK_PATH
        );

        Ok(Self {
            container,
            shared_strings,
            styles,
            sheets,
        })
    }

    /// Get a reference to the container.
    pub fn container(&self) -> &OoxmlContainer {
        &self.container
    }

    /// Sheets with their part paths.
    pub fn sheets(&self) -> &[SheetInfo] {
        &self.sheets
    }
}

impl WorkbookReader for XlsxReader {
    fn format(&self) -> FormatType {
        FormatType::Xlsx
    }

    fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|s| s.name.clone()).collect()
    }

    fn read_sheet(&mut self, sheet: &SheetSelector, handler: &mut dyn SheetHandler) -> Result<()> {
        let idx = sheet.resolve(&self.sheet_names())?;
        let info = &self.sheets[idx];
        tracing::debug!(sheet = %info.name, path = %info.path, "reading sheet");

        let shared_strings = &self.shared_strings;
        let styles = &self.styles;
        self.container.with_entry(&info.path, |source| {
            parse_sheet(source, &info.name, shared_strings, styles, handler)
        })
    }

    fn is_date_format(&self, format_id: u32) -> bool {
        self.styles.is_date_format(format_id)
    }
}

impl std::fmt::Debug for XlsxReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XlsxReader")
            .field("sheets", &self.sheet_names())
            .field("shared_strings", &self.shared_strings.len())
            .finish()
    }
}
