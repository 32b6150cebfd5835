//! Binding of sheet rows to typed records.
//!
//! A [`Binding`] pairs a [`SheetSchema`] with an explicit table of record
//! fields. Each [`Field`] knows its scalar kind and how to read and store
//! its value, so rows can be decoded into records and records encoded into
//! rows without any runtime reflection.
//!
//! # Example
//!
//! ```no_run
//! use sheetbind::{
//!     open_workbook, Binding, ColumnSchema, Field, Record, SheetSchema, SheetSchemaParams,
//!     SheetSelector,
//! };
//!
//! #[derive(Default)]
//! struct Person {
//!     name: String,
//!     age: i32,
//! }
//!
//! impl Record for Person {
//!     fn fields() -> Vec<Field<Self>> {
//!         vec![
//!             Field::new("name", |p: &Person| &p.name, |p, v| p.name = v),
//!             Field::new("age", |p: &Person| &p.age, |p, v| p.age = v),
//!         ]
//!     }
//! }
//!
//! let schema = SheetSchema::builder(SheetSchemaParams::default())
//!     .column("name", ColumnSchema::new(0, "Name"))
//!     .column("age", ColumnSchema::new(1, "Age"))
//!     .build()?;
//! let binding = Binding::<Person>::for_record(schema)?;
//!
//! let mut workbook = open_workbook("people.xlsx")?;
//! let people = binding.read_all(workbook.as_mut(), SheetSelector::Index(0))?;
//! # Ok::<(), sheetbind::Error>(())
//! ```

mod dynamic;
mod read;
#[cfg(feature = "xlsx")]
mod write;

pub use dynamic::{DeclaredColumn, DynamicRecord, SchemaDocument};
pub use read::RecordReader;
#[cfg(feature = "xlsx")]
pub use write::RecordWriter;

use crate::error::{Error, Result};
use crate::reader::{SheetSelector, WorkbookReader};
use crate::schema::{ColumnSchema, MatchBy, SheetSchema};
use crate::value::{ScalarKind, Value};
#[cfg(feature = "xlsx")]
use crate::xlsx::{SheetStats, XlsxWriter};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use std::collections::HashMap;
#[cfg(feature = "xlsx")]
use std::io::{Seek, Write};
use unicode_normalization::UnicodeNormalization;

/// A Rust type that can be stored in a record field.
pub trait FieldValue: Sized {
    /// Scalar kind cells are coerced to.
    const KIND: ScalarKind;

    /// Take a value of [`KIND`](Self::KIND); `None` on a kind mismatch.
    fn from_value(value: Value) -> Option<Self>;

    /// Current value; `None` when absent.
    fn to_value(&self) -> Option<Value>;
}

macro_rules! impl_field_value {
    ($ty:ty, $kind:ident) => {
        impl FieldValue for $ty {
            const KIND: ScalarKind = ScalarKind::$kind;

            fn from_value(value: Value) -> Option<Self> {
                match value {
                    Value::$kind(v) => Some(v),
                    _ => None,
                }
            }

            fn to_value(&self) -> Option<Value> {
                Some(Value::$kind(self.clone()))
            }
        }
    };
}

impl_field_value!(i32, Int);
impl_field_value!(i64, Long);
impl_field_value!(f64, Float);
impl_field_value!(Decimal, Decimal);
impl_field_value!(bool, Bool);
impl_field_value!(NaiveDateTime, Date);
impl_field_value!(String, Text);

impl FieldValue for NaiveDate {
    const KIND: ScalarKind = ScalarKind::Date;

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Date(dt) => Some(dt.date()),
            _ => None,
        }
    }

    fn to_value(&self) -> Option<Value> {
        Some(Value::Date(self.and_time(NaiveTime::MIN)))
    }
}

impl<V: FieldValue> FieldValue for Option<V> {
    const KIND: ScalarKind = V::KIND;

    fn from_value(value: Value) -> Option<Self> {
        V::from_value(value).map(Some)
    }

    fn to_value(&self) -> Option<Value> {
        self.as_ref().and_then(V::to_value)
    }
}

type Getter<T> = Box<dyn Fn(&T) -> Option<Value>>;
type Setter<T> = Box<dyn Fn(&mut T, Value) -> std::result::Result<(), String>>;

/// Accessors for one field of a record type.
pub struct Field<T> {
    name: String,
    kind: ScalarKind,
    get: Getter<T>,
    set: Setter<T>,
}

impl<T: 'static> Field<T> {
    /// Field backed by a plain struct member.
    pub fn new<V: FieldValue + 'static>(
        name: impl Into<String>,
        get: fn(&T) -> &V,
        set: fn(&mut T, V),
    ) -> Self {
        Self {
            name: name.into(),
            kind: V::KIND,
            get: Box::new(move |record| get(record).to_value()),
            set: Box::new(move |record, value| {
                let found = value.kind();
                let value = V::from_value(value)
                    .ok_or_else(|| format!("expected a {} value, found {}", V::KIND, found))?;
                set(record, value);
                Ok(())
            }),
        }
    }

    /// Field with arbitrary accessors.
    ///
    /// The setter may reject a value with a message, which aborts the read
    /// with [`Error::FieldAssignment`].
    pub fn custom(
        name: impl Into<String>,
        kind: ScalarKind,
        get: impl Fn(&T) -> Option<Value> + 'static,
        set: impl Fn(&mut T, Value) -> std::result::Result<(), String> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            get: Box::new(get),
            set: Box::new(set),
        }
    }
}

impl<T> Field<T> {
    /// Field name as used in schemas.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Scalar kind of the field.
    pub fn kind(&self) -> ScalarKind {
        self.kind
    }

    pub(crate) fn get(&self, record: &T) -> Option<Value> {
        (self.get)(record)
    }

    pub(crate) fn set(&self, record: &mut T, value: Value) -> std::result::Result<(), String> {
        (self.set)(record, value)
    }
}

impl<T> std::fmt::Debug for Field<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

/// A record type with a fixed field table.
pub trait Record: Default + 'static {
    /// Fields of the record in declaration order.
    fn fields() -> Vec<Field<Self>>;
}

/// A schema column bound to a record field.
#[derive(Debug)]
pub(crate) struct BoundColumn {
    pub(crate) field: usize,
    pub(crate) column: ColumnSchema,
    /// Header written for the column
    pub(crate) title: String,
}

/// Normalize header text for matching.
pub(crate) fn normalize_title(title: &str) -> String {
    title.trim().nfc().collect()
}

/// A validated pairing of a sheet schema with record fields.
pub struct Binding<T> {
    schema: SheetSchema,
    fields: Vec<Field<T>>,
    bound: Vec<BoundColumn>,
    by_position: HashMap<usize, usize>,
    by_title: HashMap<String, usize>,
}

impl<T> Binding<T> {
    /// Bind `schema` columns to `fields` by field name.
    ///
    /// Fields without a column are left alone. Fails when a column names an
    /// unknown field or when two columns collide on position or title.
    pub fn new(schema: SheetSchema, fields: Vec<Field<T>>) -> Result<Self> {
        let field_index: HashMap<&str, usize> = fields
            .iter()
            .enumerate()
            .map(|(idx, f)| (f.name(), idx))
            .collect();
        if field_index.len() != fields.len() {
            return Err(Error::InvalidSchema("record declares a field twice".to_string()));
        }

        let mut bound = Vec::new();
        let mut by_position = HashMap::new();
        let mut by_title = HashMap::new();

        for (name, column) in schema.columns() {
            let field = *field_index.get(name).ok_or_else(|| {
                Error::InvalidSchema(format!("column declared for unknown field '{}'", name))
            })?;
            let title = if column.title.trim().is_empty() {
                name.to_string()
            } else {
                column.title.clone()
            };

            let idx = bound.len();
            if by_position.insert(column.position, idx).is_some() {
                return Err(Error::InvalidSchema(format!(
                    "fields collide on column position {}",
                    column.position
                )));
            }
            let key = normalize_title(&title);
            if by_title.insert(key.clone(), idx).is_some() {
                return Err(Error::InvalidSchema(format!("fields collide on title '{}'", key)));
            }

            bound.push(BoundColumn {
                field,
                column: column.clone(),
                title,
            });
        }

        if bound.is_empty() {
            return Err(Error::InvalidSchema("no field is bound to a column".to_string()));
        }

        tracing::trace!(columns = bound.len(), fields = fields.len(), "binding created");
        Ok(Self {
            schema,
            fields,
            bound,
            by_position,
            by_title,
        })
    }

    /// The schema of this binding.
    pub fn schema(&self) -> &SheetSchema {
        &self.schema
    }

    /// The bound fields.
    pub fn fields(&self) -> &[Field<T>] {
        &self.fields
    }

    pub(crate) fn bound(&self) -> &[BoundColumn] {
        &self.bound
    }

    pub(crate) fn field_of(&self, bound: &BoundColumn) -> &Field<T> {
        &self.fields[bound.field]
    }

    pub(crate) fn column_at(&self, position: usize) -> Option<&BoundColumn> {
        self.by_position.get(&position).map(|&idx| &self.bound[idx])
    }

    /// Resolve an incoming column to its binding.
    ///
    /// `titles` maps column positions to the normalized header text seen in
    /// the title row.
    pub(crate) fn resolve(
        &self,
        column: usize,
        titles: &HashMap<usize, String>,
    ) -> Option<&BoundColumn> {
        match self.schema.params().match_by {
            MatchBy::Position => self.column_at(column),
            MatchBy::Title => titles
                .get(&column)
                .and_then(|title| self.by_title.get(title))
                .map(|&idx| &self.bound[idx]),
        }
    }

    /// Decode one sheet, handing each record to `on_record` with its row.
    pub fn read_each<F>(
        &self,
        reader: &mut dyn WorkbookReader,
        sheet: impl Into<SheetSelector>,
        on_record: F,
    ) -> Result<()>
    where
        T: Default,
        F: FnMut(usize, T) -> Result<()>,
    {
        let mut handler = self.handler(on_record);
        reader.read_sheet(&sheet.into(), &mut handler)
    }

    /// Decode one sheet into a vector of records.
    pub fn read_all(
        &self,
        reader: &mut dyn WorkbookReader,
        sheet: impl Into<SheetSelector>,
    ) -> Result<Vec<T>>
    where
        T: Default,
    {
        let mut records = Vec::new();
        self.read_each(reader, sheet, |_, record| {
            records.push(record);
            Ok(())
        })?;
        Ok(records)
    }

    /// A sheet handler producing records, for use with
    /// [`WorkbookReader::read_sheets`].
    pub fn handler<F>(&self, on_record: F) -> RecordReader<'_, T, F>
    where
        T: Default,
        F: FnMut(usize, T) -> Result<()>,
    {
        RecordReader::new(self, on_record)
    }
}

#[cfg(feature = "xlsx")]
impl<T> Binding<T> {
    /// A row source encoding `records`.
    pub fn writer<'b, I>(&'b self, records: I) -> RecordWriter<'b, T, I::IntoIter>
    where
        I: IntoIterator<Item = &'b T>,
    {
        RecordWriter::new(self, records.into_iter())
    }

    /// Encode `records` as a new sheet of `writer`.
    pub fn write_to<'b, W, I>(&'b self, writer: &mut XlsxWriter<W>, records: I) -> Result<SheetStats>
    where
        W: Write + Seek,
        I: IntoIterator<Item = &'b T>,
    {
        let mut source = self.writer(records);
        writer.write_sheet(&mut source)
    }
}

impl<T: Record> Binding<T> {
    /// Bind `schema` to the fields declared by the record type.
    pub fn for_record(schema: SheetSchema) -> Result<Self> {
        Self::new(schema, T::fields())
    }
}

impl<T> std::fmt::Debug for Binding<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binding")
            .field("schema", &self.schema)
            .field("fields", &self.fields)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SheetSchemaParams;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Item {
        code: String,
        qty: i64,
        due: Option<NaiveDate>,
    }

    impl Record for Item {
        fn fields() -> Vec<Field<Self>> {
            vec![
                Field::new("code", |i: &Item| &i.code, |i, v| i.code = v),
                Field::new("qty", |i: &Item| &i.qty, |i, v| i.qty = v),
                Field::new("due", |i: &Item| &i.due, |i, v| i.due = v),
            ]
        }
    }

    fn schema(params: SheetSchemaParams) -> SheetSchema {
        SheetSchema::builder(params)
            .column("code", ColumnSchema::new(0, "Code"))
            .column("qty", ColumnSchema::new(1, ""))
            .build()
            .unwrap()
    }

    #[test]
    fn test_field_accessors() {
        let fields = Item::fields();
        assert_eq!(fields[1].kind(), ScalarKind::Long);
        assert_eq!(fields[2].kind(), ScalarKind::Date);

        let mut item = Item::default();
        fields[1].set(&mut item, Value::Long(4)).unwrap();
        assert_eq!(item.qty, 4);
        assert_eq!(fields[1].get(&item), Some(Value::Long(4)));
        assert_eq!(fields[2].get(&item), None);

        let err = fields[1].set(&mut item, Value::Text("x".into())).unwrap_err();
        assert_eq!(err, "expected a long value, found text");
    }

    #[test]
    fn test_binding_titles_fall_back_to_field_names() {
        let binding = Binding::<Item>::for_record(schema(SheetSchemaParams::default())).unwrap();
        let titles: HashMap<usize, String> =
            [(0, "Code".to_string()), (1, "qty".to_string())].into_iter().collect();

        assert_eq!(binding.bound().len(), 2);
        assert_eq!(binding.column_at(1).map(|b| b.title.as_str()), Some("qty"));
        assert!(binding.column_at(2).is_none());

        let by_title = Binding::<Item>::for_record(schema(
            SheetSchemaParams::default().with_match_by(MatchBy::Title),
        ))
        .unwrap();
        assert_eq!(by_title.resolve(1, &titles).map(|b| b.column.position), Some(1));
        assert!(by_title.resolve(2, &titles).is_none());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let schema = SheetSchema::builder(SheetSchemaParams::default())
            .column("missing", ColumnSchema::new(0, "M"))
            .build()
            .unwrap();
        let err = Binding::<Item>::for_record(schema).unwrap_err();
        assert!(matches!(err, Error::InvalidSchema(_)));
    }

    #[test]
    fn test_title_collision_after_fallback() {
        // A blank title falls back to the field name, which may collide
        let schema = SheetSchema::builder(SheetSchemaParams::default())
            .column("code", ColumnSchema::new(0, "qty"))
            .column("qty", ColumnSchema::new(1, ""))
            .build()
            .unwrap();
        assert!(Binding::<Item>::for_record(schema).is_err());
    }

    #[test]
    fn test_titles_are_nfc_normalized() {
        // "é" composed vs decomposed
        assert_eq!(normalize_title(" Caf\u{0065}\u{0301} "), normalize_title("Caf\u{00e9}"));
    }
}
