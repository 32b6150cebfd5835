//! Streaming XLSX writer.
//!
//! Each sheet is produced row by row from a [`RowSource`]. Depending on the
//! expected row count the sheet body is either assembled in memory or
//! spilled row by row to an anonymous temporary file, so writing very large
//! sheets keeps only the current row in memory.

use crate::column::cell_reference;
use crate::detect::{detect_format_from_path, FormatType};
use crate::error::{Error, Result};
use crate::schema::SheetSchemaParams;
use crate::value::{CellData, CellOutput, CellType};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::Path;
use unicode_width::UnicodeWidthStr;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::style_sheet::{CellStyle, StyleRegistry};

/// Widest column Excel accepts.
const MAX_COLUMN_WIDTH: usize = 255;

pub(super) const NS_MAIN: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const NS_DOCUMENT_RELATIONSHIPS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const NS_PACKAGE_RELATIONSHIPS: &str =
    "http://schemas.openxmlformats.org/package/2006/relationships";
const NS_CONTENT_TYPES: &str = "http://schemas.openxmlformats.org/package/2006/content-types";

const REL_OFFICE_DOCUMENT: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
const REL_WORKSHEET: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet";
const REL_STYLES: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles";

const CT_RELATIONSHIPS: &str = "application/vnd.openxmlformats-package.relationships+xml";
const CT_WORKBOOK: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml";
const CT_STYLES: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml";
const CT_WORKSHEET: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml";

/// Characters Excel rejects in sheet names.
const INVALID_SHEET_NAME_CHARS: &[char] = &['[', ']', ':', '*', '?', '/', '\\'];

/// Producer of the rows of one sheet.
///
/// The writer asks for rows in ascending order starting at 0 until
/// [`is_exhausted`](Self::is_exhausted) returns true.
pub trait RowSource {
    /// Sheet parameters: name, header placement and styling.
    fn params(&self) -> &SheetSchemaParams;

    /// Column positions requested for every row, ascending.
    fn columns(&self) -> Vec<usize>;

    /// Expected number of rows, if known.
    fn row_hint(&self) -> Option<usize>;

    /// Check if no row at or after `row` will be produced.
    fn is_exhausted(&mut self, row: usize) -> bool;

    /// Check if `row` has content.
    fn has_row(&mut self, row: usize) -> bool;

    /// A row with content starts.
    fn begin_row(&mut self, row: usize) -> Result<()>;

    /// Cell of the current row at `column`; `None` leaves it out entirely.
    fn write_cell(&mut self, column: usize) -> Result<Option<CellOutput>>;

    /// The current row ends.
    fn end_row(&mut self, row: usize) -> Result<()>;

    /// No more rows will be requested.
    fn end(&mut self) -> Result<()>;
}

/// Where a sheet body lives until the sheet is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Whole body in memory, flushed once at close
    InMemory,
    /// Every closed row goes straight to a temporary file
    Streaming,
}

impl CachePolicy {
    /// Pick the policy for a sheet expected to hold `row_hint` rows.
    ///
    /// Unknown row counts stream.
    pub fn select(threshold: usize, row_hint: Option<usize>) -> Self {
        match row_hint {
            Some(rows) if rows < threshold => CachePolicy::InMemory,
            _ => CachePolicy::Streaming,
        }
    }
}

/// Summary of one written sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SheetStats {
    /// Rows written
    pub rows: usize,
    /// Cache policy used
    pub policy: CachePolicy,
    /// Largest number of rows held in memory at once
    pub peak_buffered_rows: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SheetState {
    NotStarted,
    Open,
    RowOpen,
    RowClosed,
    Closed,
}

enum Body {
    Memory(Vec<u8>),
    Spill(BufWriter<File>),
}

impl Body {
    /// XML writer appending to the body.
    fn xml(&mut self) -> Writer<&mut dyn Write> {
        match self {
            Body::Memory(bytes) => Writer::new(bytes as &mut dyn Write),
            Body::Spill(file) => Writer::new(file as &mut dyn Write),
        }
    }
}

/// Per-sheet writing state.
struct SheetBuffer {
    state: SheetState,
    policy: CachePolicy,
    body: Body,
    current_row: Option<usize>,
    last_row: Option<usize>,
    rows: usize,
    buffered_rows: usize,
    peak_buffered_rows: usize,
    widths: Option<BTreeMap<usize, usize>>,
}

impl SheetBuffer {
    fn new(policy: CachePolicy, auto_width: bool) -> Self {
        Self {
            state: SheetState::NotStarted,
            policy,
            body: Body::Memory(Vec::new()),
            current_row: None,
            last_row: None,
            rows: 0,
            buffered_rows: 0,
            peak_buffered_rows: 0,
            widths: auto_width.then(BTreeMap::new),
        }
    }

    fn expect(&self, allowed: &[SheetState], operation: &str) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(Error::InvalidState(format!(
                "cannot {} while sheet is {:?}",
                operation, self.state
            )))
        }
    }

    fn open(&mut self) -> Result<()> {
        self.expect(&[SheetState::NotStarted], "open sheet")?;
        if self.policy == CachePolicy::Streaming {
            self.body = Body::Spill(BufWriter::new(tempfile::tempfile()?));
        }
        self.state = SheetState::Open;
        Ok(())
    }

    fn begin_row(&mut self, row: usize) -> Result<()> {
        self.expect(&[SheetState::Open, SheetState::RowClosed], "begin row")?;
        if self.last_row.is_some_and(|last| row <= last) {
            return Err(Error::InvalidState(format!(
                "row {} written after row {}",
                row,
                self.last_row.unwrap_or_default()
            )));
        }

        let number = (row + 1).to_string();
        self.body.xml().write_event(Event::Start(
            BytesStart::new("row").with_attributes([("r", number.as_str())]),
        ))?;
        self.current_row = Some(row);
        self.peak_buffered_rows = self.peak_buffered_rows.max(self.buffered_rows + 1);
        self.state = SheetState::RowOpen;
        Ok(())
    }

    fn cell(&mut self, column: usize, style: u32, output: &CellOutput) -> Result<()> {
        self.expect(&[SheetState::RowOpen], "write cell")?;
        let row = self.current_row.unwrap_or_default();
        write_cell_element(&mut self.body.xml(), &cell_reference(row, column), style, output)?;

        if let Some(widths) = self.widths.as_mut() {
            let width = display_width(output);
            let entry = widths.entry(column).or_insert(0);
            *entry = (*entry).max(width);
        }
        Ok(())
    }

    fn end_row(&mut self) -> Result<()> {
        self.expect(&[SheetState::RowOpen], "end row")?;
        self.body.xml().write_event(Event::End(BytesEnd::new("row")))?;
        if let Body::Memory(_) = self.body {
            self.buffered_rows += 1;
        }

        self.rows += 1;
        self.last_row = self.current_row.take();
        self.state = SheetState::RowClosed;
        Ok(())
    }

    /// Write the finished sheet into the archive.
    fn close<W: Write + Seek>(&mut self, zip: &mut ZipWriter<W>, path: &str) -> Result<SheetStats> {
        self.expect(&[SheetState::Open, SheetState::RowClosed], "close sheet")?;

        zip.start_file(path, file_options())?;
        let mut xml = Writer::new(&mut *zip);
        write_declaration(&mut xml)?;
        xml.write_event(Event::Start(BytesStart::new("worksheet").with_attributes([
            ("xmlns", NS_MAIN),
            ("xmlns:r", NS_DOCUMENT_RELATIONSHIPS),
        ])))?;

        if let Some(widths) = self.widths.as_ref().filter(|w| !w.is_empty()) {
            xml.write_event(Event::Start(BytesStart::new("cols")))?;
            for (column, width) in widths {
                let index = (column + 1).to_string();
                let width = (width + 2).min(MAX_COLUMN_WIDTH).to_string();
                write_empty(
                    &mut xml,
                    "col",
                    &[
                        ("min", index.as_str()),
                        ("max", index.as_str()),
                        ("width", width.as_str()),
                        ("customWidth", "1"),
                    ],
                )?;
            }
            end(&mut xml, "cols")?;
        }

        // Rows are already serialized; the body is copied as is
        xml.write_event(Event::Start(BytesStart::new("sheetData")))?;
        match std::mem::replace(&mut self.body, Body::Memory(Vec::new())) {
            Body::Memory(bytes) => xml.get_mut().write_all(&bytes)?,
            Body::Spill(writer) => {
                let mut file = writer.into_inner().map_err(|e| Error::Io(e.into_error()))?;
                file.seek(SeekFrom::Start(0))?;
                io::copy(&mut file, xml.get_mut())?;
            }
        }
        end(&mut xml, "sheetData")?;
        end(&mut xml, "worksheet")?;

        self.state = SheetState::Closed;
        Ok(SheetStats {
            rows: self.rows,
            policy: self.policy,
            peak_buffered_rows: self.peak_buffered_rows,
        })
    }
}

fn write_cell_element<W: Write>(
    xml: &mut Writer<W>,
    reference: &str,
    style: u32,
    output: &CellOutput,
) -> io::Result<()> {
    let mut c = BytesStart::new("c");
    c.push_attribute(("r", reference));
    if style != 0 {
        c.push_attribute(("s", style.to_string().as_str()));
    }

    match &output.data {
        CellData::Empty => {
            // A typed empty boolean still reads back as false
            if output.cell_type == CellType::Boolean {
                c.push_attribute(("t", "b"));
            }
            return xml.write_event(Event::Empty(c));
        }
        CellData::Bool(b) => {
            c.push_attribute(("t", "b"));
            xml.write_event(Event::Start(c))?;
            write_value(xml, if *b { "1" } else { "0" })?;
        }
        CellData::Number(n) => {
            xml.write_event(Event::Start(c))?;
            write_value(xml, n)?;
        }
        CellData::Text(s) => {
            c.push_attribute(("t", "inlineStr"));
            xml.write_event(Event::Start(c))?;
            xml.write_event(Event::Start(BytesStart::new("is")))?;
            xml.write_event(Event::Start(
                BytesStart::new("t").with_attributes([("xml:space", "preserve")]),
            ))?;
            xml.write_event(Event::Text(BytesText::new(s)))?;
            end(xml, "t")?;
            end(xml, "is")?;
        }
    }
    end(xml, "c")
}

fn write_value<W: Write>(xml: &mut Writer<W>, value: &str) -> io::Result<()> {
    xml.write_event(Event::Start(BytesStart::new("v")))?;
    xml.write_event(Event::Text(BytesText::new(value)))?;
    end(xml, "v")
}

pub(super) fn write_declaration<W: Write>(xml: &mut Writer<W>) -> io::Result<()> {
    xml.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))
}

pub(super) fn write_empty<W: Write>(
    xml: &mut Writer<W>,
    name: &str,
    attributes: &[(&str, &str)],
) -> io::Result<()> {
    xml.write_event(Event::Empty(
        BytesStart::new(name).with_attributes(attributes.iter().copied()),
    ))
}

/// Open `name` with a `count` attribute.
pub(super) fn start_counted<W: Write>(
    xml: &mut Writer<W>,
    name: &str,
    count: usize,
) -> io::Result<()> {
    let count = count.to_string();
    xml.write_event(Event::Start(
        BytesStart::new(name).with_attributes([("count", count.as_str())]),
    ))
}

pub(super) fn end<W: Write>(xml: &mut Writer<W>, name: &str) -> io::Result<()> {
    xml.write_event(Event::End(BytesEnd::new(name)))
}

/// Approximate rendered width of a cell in characters.
fn display_width(output: &CellOutput) -> usize {
    let text_width = output.data.display_text().width();
    match (&output.data, output.format.as_deref()) {
        // Formatted numbers render at least as wide as their format
        (CellData::Number(_), Some(format)) => text_width.max(format.width()),
        _ => text_width,
    }
}

fn file_options() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(CompressionMethod::Deflated)
}

fn validate_sheet_name(name: &str, existing: &[String]) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::InvalidSchema("sheet name is empty".to_string()));
    }
    if name.chars().count() > 31 {
        return Err(Error::InvalidSchema(format!(
            "sheet name '{}' is longer than 31 characters",
            name
        )));
    }
    if name.contains(INVALID_SHEET_NAME_CHARS) {
        return Err(Error::InvalidSchema(format!(
            "sheet name '{}' contains one of []:*?/\\",
            name
        )));
    }
    if existing.iter().any(|n| n.eq_ignore_ascii_case(name)) {
        return Err(Error::InvalidSchema(format!("duplicate sheet name '{}'", name)));
    }
    Ok(())
}

/// Writer for zipped-XML (.xlsx) workbooks.
///
/// # Example
///
/// ```no_run
/// use std::io::Cursor;
/// use sheetbind::xlsx::XlsxWriter;
///
/// let writer = XlsxWriter::new(Cursor::new(Vec::new()));
/// // writer.write_sheet(&mut source)?;
/// let bytes = writer.finish()?.into_inner();
/// # Ok::<(), sheetbind::Error>(())
/// ```
pub struct XlsxWriter<W: Write + Seek> {
    zip: ZipWriter<W>,
    styles: StyleRegistry,
    sheets: Vec<String>,
}

impl<W: Write + Seek> XlsxWriter<W> {
    /// Create a writer over a seekable sink.
    pub fn new(inner: W) -> Self {
        Self {
            zip: ZipWriter::new(inner),
            styles: StyleRegistry::new(),
            sheets: Vec::new(),
        }
    }

    /// Write one sheet from `source`.
    pub fn write_sheet(&mut self, source: &mut dyn RowSource) -> Result<SheetStats> {
        let params = source.params().clone();
        let name = params.write_sheet_name.clone();
        validate_sheet_name(&name, &self.sheets)?;

        let policy = CachePolicy::select(params.cache_threshold, source.row_hint());
        tracing::debug!(
            sheet = %name,
            ?policy,
            row_hint = ?source.row_hint(),
            threshold = params.cache_threshold,
            "writing sheet"
        );

        let title_row = params
            .write_title
            .then(|| params.title_row().unwrap_or(0));
        let title_style = self.styles.register(&CellStyle {
            num_fmt: None,
            bold: true,
            fill: params.title_color,
            border: params.border,
            wrap: params.wrap,
        });
        let columns = source.columns();

        let mut sheet = SheetBuffer::new(policy, params.auto_width);
        sheet.open()?;

        let mut row = 0;
        while !source.is_exhausted(row) {
            if source.has_row(row) {
                source.begin_row(row)?;
                sheet.begin_row(row)?;
                for &column in &columns {
                    let Some(output) = source.write_cell(column)? else {
                        continue;
                    };
                    let style = if title_row == Some(row) {
                        title_style
                    } else {
                        self.styles.register(&CellStyle {
                            num_fmt: output.format.as_deref(),
                            bold: false,
                            fill: params.content_color,
                            border: params.border,
                            wrap: params.wrap,
                        })
                    };
                    sheet.cell(column, style, &output)?;
                }
                sheet.end_row()?;
                source.end_row(row)?;
            }
            row += 1;
        }
        source.end()?;

        let path = format!("xl/worksheets/sheet{}.xml", self.sheets.len() + 1);
        let stats = sheet.close(&mut self.zip, &path)?;
        tracing::debug!(
            sheet = %name,
            rows = stats.rows,
            peak_buffered_rows = stats.peak_buffered_rows,
            "sheet written"
        );
        self.sheets.push(name);
        Ok(stats)
    }

    /// Write the workbook parts and return the underlying sink.
    pub fn finish(mut self) -> Result<W> {
        if self.sheets.is_empty() {
            return Err(Error::InvalidState("workbook has no sheets".to_string()));
        }

        let count = self.sheets.len();

        self.zip.start_file("[Content_Types].xml", file_options())?;
        write_content_types(&mut Writer::new(&mut self.zip), count)?;

        self.zip.start_file("_rels/.rels", file_options())?;
        let mut xml = Writer::new(&mut self.zip);
        write_declaration(&mut xml)?;
        start_relationships(&mut xml)?;
        write_relationship(&mut xml, 1, REL_OFFICE_DOCUMENT, "xl/workbook.xml")?;
        end(&mut xml, "Relationships")?;

        self.zip.start_file("xl/workbook.xml", file_options())?;
        write_workbook(&mut Writer::new(&mut self.zip), &self.sheets)?;

        self.zip.start_file("xl/_rels/workbook.xml.rels", file_options())?;
        let mut xml = Writer::new(&mut self.zip);
        write_declaration(&mut xml)?;
        start_relationships(&mut xml)?;
        for idx in 1..=count {
            let target = format!("worksheets/sheet{}.xml", idx);
            write_relationship(&mut xml, idx, REL_WORKSHEET, &target)?;
        }
        write_relationship(&mut xml, count + 1, REL_STYLES, "styles.xml")?;
        end(&mut xml, "Relationships")?;

        self.zip.start_file("xl/styles.xml", file_options())?;
        self.styles.write_xml(&mut Writer::new(&mut self.zip))?;

        tracing::debug!(sheets = count, styles = self.styles.len(), "workbook finished");
        Ok(self.zip.finish()?)
    }
}

fn write_content_types<W: Write>(xml: &mut Writer<W>, sheets: usize) -> io::Result<()> {
    write_declaration(xml)?;
    xml.write_event(Event::Start(
        BytesStart::new("Types").with_attributes([("xmlns", NS_CONTENT_TYPES)]),
    ))?;
    write_empty(
        xml,
        "Default",
        &[("Extension", "rels"), ("ContentType", CT_RELATIONSHIPS)],
    )?;
    write_empty(
        xml,
        "Default",
        &[("Extension", "xml"), ("ContentType", "application/xml")],
    )?;
    write_empty(
        xml,
        "Override",
        &[("PartName", "/xl/workbook.xml"), ("ContentType", CT_WORKBOOK)],
    )?;
    write_empty(
        xml,
        "Override",
        &[("PartName", "/xl/styles.xml"), ("ContentType", CT_STYLES)],
    )?;
    for idx in 1..=sheets {
        let part = format!("/xl/worksheets/sheet{}.xml", idx);
        write_empty(
            xml,
            "Override",
            &[("PartName", part.as_str()), ("ContentType", CT_WORKSHEET)],
        )?;
    }
    end(xml, "Types")
}

fn write_workbook<W: Write>(xml: &mut Writer<W>, sheets: &[String]) -> io::Result<()> {
    write_declaration(xml)?;
    xml.write_event(Event::Start(BytesStart::new("workbook").with_attributes([
        ("xmlns", NS_MAIN),
        ("xmlns:r", NS_DOCUMENT_RELATIONSHIPS),
    ])))?;
    xml.write_event(Event::Start(BytesStart::new("sheets")))?;
    for (idx, name) in sheets.iter().enumerate() {
        let sheet_id = (idx + 1).to_string();
        let rel_id = format!("rId{}", idx + 1);
        write_empty(
            xml,
            "sheet",
            &[
                ("name", name.as_str()),
                ("sheetId", sheet_id.as_str()),
                ("r:id", rel_id.as_str()),
            ],
        )?;
    }
    end(xml, "sheets")?;
    end(xml, "workbook")
}

fn start_relationships<W: Write>(xml: &mut Writer<W>) -> io::Result<()> {
    xml.write_event(Event::Start(
        BytesStart::new("Relationships").with_attributes([("xmlns", NS_PACKAGE_RELATIONSHIPS)]),
    ))
}

fn write_relationship<W: Write>(
    xml: &mut Writer<W>,
    id: usize,
    kind: &str,
    target: &str,
) -> io::Result<()> {
    let id = format!("rId{}", id);
    write_empty(
        xml,
        "Relationship",
        &[("Id", id.as_str()), ("Type", kind), ("Target", target)],
    )
}

impl XlsxWriter<BufWriter<File>> {
    /// Create a writer for a new file at `path`.
    ///
    /// Legacy `.xls` output is not supported.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Ok(FormatType::Xls) = detect_format_from_path(path) {
            return Err(Error::UnsupportedFormat(format!(
                "writing {} is not supported",
                FormatType::Xls.name()
            )));
        }
        let file = File::create(path)?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write + Seek> std::fmt::Debug for XlsxWriter<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XlsxWriter")
            .field("sheets", &self.sheets)
            .field("styles", &self.styles.len())
            .finish()
    }
}

/// Write a workbook file through `f`.
///
/// When `f` or finishing the archive fails, the partially written file is
/// removed before the error is returned.
///
/// # Example
///
/// ```no_run
/// sheetbind::write_xlsx("out.xlsx", |writer| {
///     // writer.write_sheet(&mut source)?;
///     Ok(())
/// })?;
/// # Ok::<(), sheetbind::Error>(())
/// ```
pub fn write_xlsx<F>(path: impl AsRef<Path>, f: F) -> Result<()>
where
    F: FnOnce(&mut XlsxWriter<BufWriter<File>>) -> Result<()>,
{
    let path = path.as_ref();
    let writer = XlsxWriter::create(path)?;

    match complete(writer, f) {
        Ok(()) => Ok(()),
        Err(e) => {
            if let Err(cleanup) = std::fs::remove_file(path) {
                tracing::warn!(path = %path.display(), "failed to remove partial output: {}", cleanup);
            }
            Err(e)
        }
    }
}

fn complete<F>(mut writer: XlsxWriter<BufWriter<File>>, f: F) -> Result<()>
where
    F: FnOnce(&mut XlsxWriter<BufWriter<File>>) -> Result<()>,
{
    f(&mut writer)?;
    let mut inner = writer.finish()?;
    inner.flush()?;
    Ok(())
}
