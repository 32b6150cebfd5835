//! Decoding of sheet rows into records.

use crate::coerce::read_cell;
use crate::column::column_letters;
use crate::error::{Error, Result};
use crate::reader::SheetHandler;
use crate::schema::{MatchBy, RowWindow};
use crate::value::CellEvent;
use std::collections::HashMap;

use super::{normalize_title, Binding};

/// A [`SheetHandler`] building one record per data row.
///
/// Records are handed to the callback at the end of their row, together
/// with the zero-based row index.
pub struct RecordReader<'b, T, F> {
    binding: &'b Binding<T>,
    on_record: F,
    window: RowWindow,
    sheet: String,
    titles: HashMap<usize, String>,
    current: Option<(usize, T)>,
    records: usize,
}

impl<'b, T, F> RecordReader<'b, T, F>
where
    T: Default,
    F: FnMut(usize, T) -> Result<()>,
{
    pub(crate) fn new(binding: &'b Binding<T>, on_record: F) -> Self {
        Self {
            binding,
            on_record,
            window: binding.schema().params().window(),
            sheet: String::new(),
            titles: HashMap::new(),
            current: None,
            records: 0,
        }
    }

    /// Number of records produced so far.
    pub fn records(&self) -> usize {
        self.records
    }

    fn matches_by_title(&self) -> bool {
        self.binding.schema().params().match_by == MatchBy::Title
    }
}

impl<T, F> SheetHandler for RecordReader<'_, T, F>
where
    T: Default,
    F: FnMut(usize, T) -> Result<()>,
{
    fn window(&self) -> RowWindow {
        self.window
    }

    fn begin_sheet(&mut self, name: &str) -> Result<()> {
        self.sheet = name.to_string();
        self.titles.clear();
        self.records = 0;
        Ok(())
    }

    fn begin_row(&mut self, row: usize) -> Result<()> {
        if self.window.contains(row) {
            self.current = Some((row, T::default()));
        }
        Ok(())
    }

    fn cell(&mut self, event: CellEvent) -> Result<()> {
        if self.matches_by_title() && self.window.is_title(event.row) {
            let title = normalize_title(event.data.display_text());
            if !title.is_empty() {
                self.titles.insert(event.column, title);
            }
            return Ok(());
        }

        let Some((row, record)) = self.current.as_mut() else {
            return Ok(());
        };
        if *row != event.row {
            return Ok(());
        }
        let Some(bound) = self.binding.resolve(event.column, &self.titles) else {
            return Ok(());
        };

        let field = self.binding.field_of(bound);
        let Some(value) = read_cell(
            field.kind(),
            &event.data,
            event.format_id,
            bound.column.expression(),
        ) else {
            tracing::trace!(
                sheet = %self.sheet,
                row = event.row,
                column = event.column,
                field = field.name(),
                "cell not coercible, field left unset"
            );
            return Ok(());
        };

        field
            .set(record, value)
            .map_err(|message| Error::FieldAssignment {
                sheet: self.sheet.clone(),
                row: event.row,
                column: column_letters(event.column),
                field: field.name().to_string(),
                message,
            })
    }

    fn end_row(&mut self, _row: usize) -> Result<()> {
        if let Some((row, record)) = self.current.take() {
            self.records += 1;
            (self.on_record)(row, record)?;
        }
        Ok(())
    }

    fn end_sheet(&mut self) -> Result<()> {
        self.current = None;
        tracing::debug!(sheet = %self.sheet, records = self.records, "sheet decoded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::{Field, Record};
    use crate::schema::{ColumnSchema, SheetSchema, SheetSchemaParams};
    use crate::value::{CellData, ScalarKind, Value};
    use rust_decimal::Decimal;

    #[derive(Debug, Default, PartialEq)]
    struct Row {
        label: String,
        amount: Decimal,
        flag: bool,
    }

    impl Record for Row {
        fn fields() -> Vec<Field<Self>> {
            vec![
                Field::new("label", |r: &Row| &r.label, |r, v| r.label = v),
                Field::new("amount", |r: &Row| &r.amount, |r, v| r.amount = v),
                Field::new("flag", |r: &Row| &r.flag, |r, v| r.flag = v),
            ]
        }
    }

    fn text(row: usize, column: usize, s: &str) -> CellEvent {
        CellEvent {
            row,
            column,
            format_id: None,
            data: CellData::Text(s.to_string()),
        }
    }

    fn number(row: usize, column: usize, s: &str) -> CellEvent {
        CellEvent {
            row,
            column,
            format_id: Some(0),
            data: CellData::Number(s.to_string()),
        }
    }

    fn feed(handler: &mut dyn SheetHandler, rows: Vec<(usize, Vec<CellEvent>)>) -> Result<()> {
        handler.begin_sheet("Data")?;
        for (row, cells) in rows {
            handler.begin_row(row)?;
            for cell in cells {
                if handler.window().wants(cell.row) {
                    handler.cell(cell)?;
                }
            }
            handler.end_row(row)?;
        }
        handler.end_sheet()
    }

    #[test]
    fn test_read_by_title_with_reordered_columns() {
        let params = SheetSchemaParams::default().with_match_by(MatchBy::Title);
        let schema = SheetSchema::builder(params)
            .column(
                "amount",
                ColumnSchema::new(0, "Amount").with_expression("2"),
            )
            .column("label", ColumnSchema::new(1, "Label"))
            .build()
            .unwrap();
        let binding = Binding::<Row>::for_record(schema).unwrap();

        let mut out = Vec::new();
        let mut handler = binding.handler(|row, record| {
            out.push((row, record));
            Ok(())
        });
        feed(
            &mut handler,
            vec![
                (0, vec![text(0, 0, " Label"), text(0, 2, "Amount ")]),
                (1, vec![text(1, 0, "first"), number(1, 2, "1.005")]),
                (2, vec![text(2, 0, "second")]),
            ],
        )
        .unwrap();
        assert_eq!(handler.records(), 2);
        drop(handler);

        assert_eq!(
            out,
            vec![
                (
                    1,
                    Row {
                        label: "first".into(),
                        amount: Decimal::new(101, 2),
                        flag: false,
                    }
                ),
                (
                    2,
                    Row {
                        label: "second".into(),
                        ..Default::default()
                    }
                ),
            ]
        );
    }

    #[test]
    fn test_uncoercible_cell_leaves_default() {
        let schema = SheetSchema::builder(SheetSchemaParams::default())
            .column("amount", ColumnSchema::new(0, "Amount"))
            .build()
            .unwrap();
        let binding = Binding::<Row>::for_record(schema).unwrap();

        let mut out = Vec::new();
        let mut handler = binding.handler(|_, record| {
            out.push(record);
            Ok(())
        });
        feed(&mut handler, vec![(1, vec![text(1, 0, "n/a")])]).unwrap();
        drop(handler);

        assert_eq!(out, vec![Row::default()]);
    }

    #[test]
    fn test_setter_failure_reports_location() {
        let fields = vec![Field::custom(
            "label",
            ScalarKind::Text,
            |r: &Row| Some(Value::Text(r.label.clone())),
            |_r: &mut Row, v| Err(format!("rejected {}", v)),
        )];
        let schema = SheetSchema::builder(SheetSchemaParams::default())
            .column("label", ColumnSchema::new(27, "Label"))
            .build()
            .unwrap();
        let binding = Binding::new(schema, fields).unwrap();

        let mut handler = binding.handler(|_, _| Ok(()));
        let err = feed(&mut handler, vec![(3, vec![text(3, 27, "x")])]).unwrap_err();
        match err {
            Error::FieldAssignment {
                sheet,
                row,
                column,
                field,
                message,
            } => {
                assert_eq!(sheet, "Data");
                assert_eq!(row, 3);
                assert_eq!(column, "AB");
                assert_eq!(field, "label");
                assert_eq!(message, "rejected x");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
