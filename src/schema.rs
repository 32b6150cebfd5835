//! Sheet schemas: column declarations and sheet-level parameters.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Default number of rows at which the writer switches to streaming output.
pub const DEFAULT_CACHE_THRESHOLD: usize = 10_000;

/// Declaration of one sheet column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    /// Zero-based column index
    pub position: usize,
    /// Header text
    #[serde(default)]
    pub title: String,
    /// Fractional digits for float/decimal, date pattern for dates
    #[serde(default)]
    pub expression: Option<String>,
}

impl ColumnSchema {
    /// Create a column at `position` with the given title.
    pub fn new(position: usize, title: impl Into<String>) -> Self {
        Self {
            position,
            title: title.into(),
            expression: None,
        }
    }

    /// Set the format expression.
    pub fn with_expression(mut self, expression: impl Into<String>) -> Self {
        self.expression = Some(expression.into());
        self
    }

    /// The expression, if any.
    pub fn expression(&self) -> Option<&str> {
        self.expression.as_deref()
    }
}

/// How incoming columns are matched to schema columns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchBy {
    /// Match on column index
    #[default]
    #[serde(alias = "byposition")]
    Position,
    /// Match on header text in the title row
    #[serde(alias = "bytitle")]
    Title,
}

/// An RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    /// ARGB hex form used in style sheets, e.g. `FFD9D9D9`.
    pub fn argb(&self) -> String {
        format!("FF{:02X}{:02X}{:02X}", self.0, self.1, self.2)
    }
}

/// Sheet-level parameters shared by reading and writing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetSchemaParams {
    /// Header row; negative means no header row
    pub title_row_index: i64,
    /// First data row
    pub data_start_row_index: usize,
    /// Last data row (inclusive); negative means unbounded
    pub data_end_row_index: i64,
    /// Column matching mode
    pub match_by: MatchBy,
    /// Sheet name used when writing
    pub write_sheet_name: String,
    /// Emit the header row when writing
    pub write_title: bool,
    /// Expected row count at which writing switches to streaming output
    pub cache_threshold: usize,
    /// Size columns to their widest value
    pub auto_width: bool,
    /// Draw thin borders around written cells
    pub border: bool,
    /// Wrap text in written cells
    pub wrap: bool,
    /// Fill color of header cells
    pub title_color: Option<Rgb>,
    /// Fill color of data cells
    pub content_color: Option<Rgb>,
}

impl Default for SheetSchemaParams {
    fn default() -> Self {
        Self {
            title_row_index: 0,
            data_start_row_index: 1,
            data_end_row_index: -1,
            match_by: MatchBy::Position,
            write_sheet_name: "Sheet1".to_string(),
            write_title: true,
            cache_threshold: DEFAULT_CACHE_THRESHOLD,
            auto_width: false,
            border: false,
            wrap: false,
            title_color: None,
            content_color: None,
        }
    }
}

impl SheetSchemaParams {
    /// Create default parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the header row (negative for none).
    pub fn with_title_row(mut self, index: i64) -> Self {
        self.title_row_index = index;
        self
    }

    /// Set the data row range; a negative end is unbounded.
    pub fn with_data_rows(mut self, start: usize, end: i64) -> Self {
        self.data_start_row_index = start;
        self.data_end_row_index = end;
        self
    }

    /// Set the matching mode.
    pub fn with_match_by(mut self, match_by: MatchBy) -> Self {
        self.match_by = match_by;
        self
    }

    /// Set the sheet name used when writing.
    pub fn with_sheet_name(mut self, name: impl Into<String>) -> Self {
        self.write_sheet_name = name.into();
        self
    }

    /// Enable or disable the header row on write.
    pub fn with_write_title(mut self, enabled: bool) -> Self {
        self.write_title = enabled;
        self
    }

    /// Set the streaming threshold.
    pub fn with_cache_threshold(mut self, rows: usize) -> Self {
        self.cache_threshold = rows;
        self
    }

    /// Enable automatic column widths.
    pub fn with_auto_width(mut self, enabled: bool) -> Self {
        self.auto_width = enabled;
        self
    }

    /// Enable cell borders.
    pub fn with_border(mut self, enabled: bool) -> Self {
        self.border = enabled;
        self
    }

    /// Enable text wrapping.
    pub fn with_wrap(mut self, enabled: bool) -> Self {
        self.wrap = enabled;
        self
    }

    /// Set header and data fill colors.
    pub fn with_colors(mut self, title: Option<Rgb>, content: Option<Rgb>) -> Self {
        self.title_color = title;
        self.content_color = content;
        self
    }

    /// Header row as an index, if there is one.
    pub fn title_row(&self) -> Option<usize> {
        usize::try_from(self.title_row_index).ok()
    }

    /// Last data row as an index, if bounded.
    pub fn data_end_row(&self) -> Option<usize> {
        usize::try_from(self.data_end_row_index).ok()
    }

    /// Row window used by readers.
    pub fn window(&self) -> RowWindow {
        RowWindow {
            title_row: self.title_row(),
            start: self.data_start_row_index,
            end: self.data_end_row(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.match_by != MatchBy::Title {
            return Ok(());
        }
        if self.title_row_index < 0 {
            return Err(Error::InvalidSchema(
                "matching by title requires a title row".to_string(),
            ));
        }
        if self.data_start_row_index as i64 <= self.title_row_index {
            return Err(Error::InvalidSchema(format!(
                "data start row {} must come after title row {}",
                self.data_start_row_index, self.title_row_index
            )));
        }
        if self.data_end_row_index >= 0 && self.data_end_row_index <= self.title_row_index {
            return Err(Error::InvalidSchema(format!(
                "data end row {} must come after title row {}",
                self.data_end_row_index, self.title_row_index
            )));
        }
        Ok(())
    }
}

/// Rows a reader materializes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowWindow {
    /// Header row, scanned regardless of `start`
    pub title_row: Option<usize>,
    /// First data row
    pub start: usize,
    /// Last data row (inclusive)
    pub end: Option<usize>,
}

impl RowWindow {
    /// Every row from 0, no header.
    pub fn all() -> Self {
        Self {
            title_row: None,
            start: 0,
            end: None,
        }
    }

    /// Check if `row` is a data row.
    pub fn contains(&self, row: usize) -> bool {
        row >= self.start && !self.is_past_end(row)
    }

    /// Check if `row` is the header row.
    pub fn is_title(&self, row: usize) -> bool {
        self.title_row == Some(row)
    }

    /// Check if cells of `row` should be emitted.
    pub fn wants(&self, row: usize) -> bool {
        self.is_title(row) || self.contains(row)
    }

    /// Check if `row` lies beyond the last data row.
    pub fn is_past_end(&self, row: usize) -> bool {
        self.end.is_some_and(|end| row > end)
    }
}

/// A validated sheet schema mapping field names to columns.
#[derive(Debug, Clone)]
pub struct SheetSchema {
    params: SheetSchemaParams,
    columns: Vec<(String, ColumnSchema)>,
    by_field: HashMap<String, usize>,
}

impl SheetSchema {
    /// Validate and build a schema from `(field name, column)` pairs.
    pub fn new(
        params: SheetSchemaParams,
        columns: impl IntoIterator<Item = (String, ColumnSchema)>,
    ) -> Result<Self> {
        params.validate()?;

        let columns: Vec<(String, ColumnSchema)> = columns.into_iter().collect();
        if columns.is_empty() {
            return Err(Error::InvalidSchema("schema declares no columns".to_string()));
        }

        let mut by_field = HashMap::new();
        let mut positions = HashSet::new();
        let mut titles = HashSet::new();

        for (idx, (field, column)) in columns.iter().enumerate() {
            if by_field.insert(field.clone(), idx).is_some() {
                return Err(Error::InvalidSchema(format!("duplicate field '{}'", field)));
            }
            if !positions.insert(column.position) {
                return Err(Error::InvalidSchema(format!(
                    "duplicate column position {} (field '{}')",
                    column.position, field
                )));
            }
            let title = column.title.trim();
            if !title.is_empty() && !titles.insert(title.to_string()) {
                return Err(Error::InvalidSchema(format!(
                    "duplicate column title '{}' (field '{}')",
                    title, field
                )));
            }
        }

        Ok(Self {
            params,
            columns,
            by_field,
        })
    }

    /// Start building a schema with the given parameters.
    pub fn builder(params: SheetSchemaParams) -> SheetSchemaBuilder {
        SheetSchemaBuilder {
            params,
            columns: Vec::new(),
        }
    }

    /// Sheet parameters.
    pub fn params(&self) -> &SheetSchemaParams {
        &self.params
    }

    /// Column declared for `field`.
    pub fn column(&self, field: &str) -> Option<&ColumnSchema> {
        self.by_field.get(field).map(|&idx| &self.columns[idx].1)
    }

    /// All `(field, column)` pairs in declaration order.
    pub fn columns(&self) -> impl Iterator<Item = (&str, &ColumnSchema)> {
        self.columns.iter().map(|(f, c)| (f.as_str(), c))
    }

    /// Number of declared columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Check if the schema has no columns (never true once built).
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Incremental construction of a [`SheetSchema`].
#[derive(Debug, Clone)]
pub struct SheetSchemaBuilder {
    params: SheetSchemaParams,
    columns: Vec<(String, ColumnSchema)>,
}

impl SheetSchemaBuilder {
    /// Declare the column of a field.
    pub fn column(mut self, field: impl Into<String>, column: ColumnSchema) -> Self {
        self.columns.push((field.into(), column));
        self
    }

    /// Validate and build.
    pub fn build(self) -> Result<SheetSchema> {
        SheetSchema::new(self.params, self.columns)
    }
}
