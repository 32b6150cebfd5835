//! Encoding of records into sheet rows.

use crate::coerce::write_cell;
use crate::error::{Error, Result};
use crate::schema::SheetSchemaParams;
use crate::value::CellOutput;
use crate::xlsx::RowSource;
use std::iter::Peekable;

use super::Binding;

enum RowContent<'b, T> {
    Title,
    Record(&'b T),
}

/// A [`RowSource`] writing one record per data row.
///
/// The title row (when enabled) holds the declared column titles; records
/// fill rows from the first data row on until they or the end bound run out.
pub struct RecordWriter<'b, T, I: Iterator<Item = &'b T>> {
    binding: &'b Binding<T>,
    records: Peekable<I>,
    hint: Option<usize>,
    title_row: Option<usize>,
    current: Option<RowContent<'b, T>>,
    written: usize,
}

impl<'b, T, I: Iterator<Item = &'b T>> RecordWriter<'b, T, I> {
    pub(crate) fn new(binding: &'b Binding<T>, records: I) -> Self {
        let params = binding.schema().params();
        let hint = match records.size_hint() {
            (lower, Some(upper)) if lower == upper => Some(lower),
            _ => None,
        };
        Self {
            binding,
            records: records.peekable(),
            hint,
            title_row: params.write_title.then(|| params.title_row().unwrap_or(0)),
            current: None,
            written: 0,
        }
    }

    /// Records written so far.
    pub fn written(&self) -> usize {
        self.written
    }

    fn is_data_row(&self, row: usize) -> bool {
        let params = self.binding.schema().params();
        Some(row) != self.title_row
            && row >= params.data_start_row_index
            && !params.data_end_row().is_some_and(|end| row > end)
    }
}

impl<'b, T, I: Iterator<Item = &'b T>> RowSource for RecordWriter<'b, T, I> {
    fn params(&self) -> &SheetSchemaParams {
        self.binding.schema().params()
    }

    fn columns(&self) -> Vec<usize> {
        let mut columns: Vec<usize> = self
            .binding
            .bound()
            .iter()
            .map(|b| b.column.position)
            .collect();
        columns.sort_unstable();
        columns
    }

    /// Number of records, when the iterator knows it exactly.
    fn row_hint(&self) -> Option<usize> {
        self.hint
    }

    fn is_exhausted(&mut self, row: usize) -> bool {
        if self.title_row.is_some_and(|title| row <= title) {
            return false;
        }
        let params = self.binding.schema().params();
        if params.data_end_row().is_some_and(|end| row > end) {
            return true;
        }
        row >= params.data_start_row_index && self.records.peek().is_none()
    }

    fn has_row(&mut self, row: usize) -> bool {
        Some(row) == self.title_row || (self.is_data_row(row) && self.records.peek().is_some())
    }

    fn begin_row(&mut self, row: usize) -> Result<()> {
        if Some(row) == self.title_row {
            self.current = Some(RowContent::Title);
            return Ok(());
        }
        let record = self
            .records
            .next()
            .ok_or_else(|| Error::InvalidState(format!("no record left for row {}", row)))?;
        self.current = Some(RowContent::Record(record));
        Ok(())
    }

    fn write_cell(&mut self, column: usize) -> Result<Option<CellOutput>> {
        let Some(bound) = self.binding.column_at(column) else {
            return Ok(None);
        };
        match &self.current {
            Some(RowContent::Title) => Ok(Some(CellOutput::text(bound.title.as_str()))),
            Some(RowContent::Record(record)) => {
                let field = self.binding.field_of(bound);
                let value = field.get(record);
                Ok(Some(write_cell(
                    field.kind(),
                    value.as_ref(),
                    bound.column.expression(),
                )))
            }
            None => Err(Error::InvalidState(format!(
                "cell {} requested outside of a row",
                column
            ))),
        }
    }

    fn end_row(&mut self, _row: usize) -> Result<()> {
        if let Some(RowContent::Record(_)) = self.current.take() {
            self.written += 1;
        }
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        let skipped = self.records.by_ref().count();
        if skipped > 0 {
            tracing::warn!(
                written = self.written,
                skipped,
                "records beyond the last data row were not written"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::{Field, Record};
    use crate::schema::{ColumnSchema, SheetSchema};
    use crate::value::{CellData, CellType};

    #[derive(Debug, Default)]
    struct Entry {
        name: String,
        score: Option<f64>,
    }

    impl Record for Entry {
        fn fields() -> Vec<Field<Self>> {
            vec![
                Field::new("name", |e: &Entry| &e.name, |e, v| e.name = v),
                Field::new("score", |e: &Entry| &e.score, |e, v| e.score = v),
            ]
        }
    }

    fn binding(params: SheetSchemaParams) -> Binding<Entry> {
        let schema = SheetSchema::builder(params)
            .column("score", ColumnSchema::new(2, "Score").with_expression("1"))
            .column("name", ColumnSchema::new(0, ""))
            .build()
            .unwrap();
        Binding::for_record(schema).unwrap()
    }

    /// Drive a source the way the writer does, collecting rows.
    fn drain(source: &mut dyn RowSource) -> Vec<(usize, Vec<Option<CellOutput>>)> {
        let columns = source.columns();
        let mut rows = Vec::new();
        let mut row = 0;
        while !source.is_exhausted(row) {
            if source.has_row(row) {
                source.begin_row(row).unwrap();
                let cells = columns
                    .iter()
                    .map(|&c| source.write_cell(c).unwrap())
                    .collect();
                source.end_row(row).unwrap();
                rows.push((row, cells));
            }
            row += 1;
        }
        source.end().unwrap();
        rows
    }

    #[test]
    fn test_title_and_records() {
        let binding = binding(SheetSchemaParams::default());
        let entries = vec![
            Entry {
                name: "a".into(),
                score: Some(1.25),
            },
            Entry {
                name: "b".into(),
                score: None,
            },
        ];

        let mut source = binding.writer(&entries);
        assert_eq!(source.columns(), vec![0, 2]);
        assert_eq!(source.row_hint(), Some(2));
        let rows = drain(&mut source);
        assert_eq!(source.written(), 2);

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].1[0], Some(CellOutput::text("name")));
        assert_eq!(rows[0].1[1], Some(CellOutput::text("Score")));
        assert_eq!(rows[1].1[1].as_ref().map(|c| &c.data), Some(&CellData::Number("1.3".into())));

        let absent = rows[2].1[1].as_ref().unwrap();
        assert_eq!(absent.data, CellData::Empty);
        assert_eq!(absent.cell_type, CellType::Numeric);
        assert_eq!(absent.format.as_deref(), Some("0.0"));
    }

    #[test]
    fn test_data_window_limits_rows() {
        let params = SheetSchemaParams::default()
            .with_title_row(1)
            .with_data_rows(3, 4);
        let binding = binding(params);
        let entries: Vec<Entry> = (0..5)
            .map(|i| Entry {
                name: i.to_string(),
                score: None,
            })
            .collect();

        let mut source = binding.writer(&entries);
        let rows = drain(&mut source);
        let indices: Vec<usize> = rows.iter().map(|(r, _)| *r).collect();
        assert_eq!(indices, vec![1, 3, 4]);
        assert_eq!(source.written(), 2);
    }

    #[test]
    fn test_without_title() {
        let params = SheetSchemaParams::default()
            .with_write_title(false)
            .with_data_rows(0, -1);
        let binding = binding(params);
        let entries = vec![Entry::default()];

        let mut source = binding.writer(&entries);
        let rows = drain(&mut source);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0, 0);
    }
}
