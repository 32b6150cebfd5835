//! Schema-defined records for sheets without a Rust record type.

use crate::error::Result;
use crate::schema::{ColumnSchema, SheetSchema, SheetSchemaParams};
use crate::value::{ScalarKind, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use super::{Binding, Field};

/// A record holding values by field name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DynamicRecord {
    values: BTreeMap<String, Value>,
}

impl DynamicRecord {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of a field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    /// Set a field.
    pub fn insert(&mut self, field: impl Into<String>, value: Value) {
        self.values.insert(field.into(), value);
    }

    /// Fields with values, in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of fields with values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if no field has a value.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A column declared in a schema document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclaredColumn {
    /// Field name
    pub field: String,
    /// Scalar kind of the field
    pub kind: ScalarKind,
    #[serde(flatten)]
    pub column: ColumnSchema,
}

/// A sheet schema declared in JSON.
///
/// ```
/// use sheetbind::SchemaDocument;
///
/// let doc = SchemaDocument::from_json(r#"{
///     "sheet": { "match_by": "title" },
///     "columns": [
///         { "field": "id", "kind": "long", "position": 0, "title": "ID" },
///         { "field": "price", "kind": "decimal", "position": 1, "title": "Price", "expression": "2" }
///     ]
/// }"#)?;
/// let binding = doc.binding()?;
/// assert_eq!(binding.fields().len(), 2);
/// # Ok::<(), sheetbind::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDocument {
    /// Sheet parameters
    #[serde(default)]
    pub sheet: SheetSchemaParams,
    /// Columns in declaration order
    pub columns: Vec<DeclaredColumn>,
}

impl SchemaDocument {
    /// Parse a schema document from JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a schema document from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&json)
    }

    /// Validate into a [`SheetSchema`].
    pub fn sheet_schema(&self) -> Result<SheetSchema> {
        SheetSchema::new(
            self.sheet.clone(),
            self.columns
                .iter()
                .map(|c| (c.field.clone(), c.column.clone())),
        )
    }

    /// Bind the declared columns to [`DynamicRecord`] fields.
    pub fn binding(&self) -> Result<Binding<DynamicRecord>> {
        let fields = self
            .columns
            .iter()
            .map(|c| dynamic_field(c.field.clone(), c.kind))
            .collect();
        Binding::new(self.sheet_schema()?, fields)
    }
}

fn dynamic_field(name: String, kind: ScalarKind) -> Field<DynamicRecord> {
    let get_name = name.clone();
    let set_name = name.clone();
    Field::custom(
        name,
        kind,
        move |record: &DynamicRecord| record.get(&get_name).cloned(),
        move |record: &mut DynamicRecord, value: Value| {
            if value.kind() != kind {
                return Err(format!("expected a {} value, found {}", kind, value.kind()));
            }
            record.insert(set_name.clone(), value);
            Ok(())
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::schema::MatchBy;

    const DOC: &str = r#"{
        "sheet": { "title_row_index": 0, "data_start_row_index": 1, "write_sheet_name": "Items" },
        "columns": [
            { "field": "name", "kind": "text", "position": 0, "title": "Name" },
            { "field": "when", "kind": "date", "position": 2, "expression": "yyyy/MM/dd" }
        ]
    }"#;

    #[test]
    fn test_parse_document() {
        let doc = SchemaDocument::from_json(DOC).unwrap();
        assert_eq!(doc.sheet.write_sheet_name, "Items");
        assert_eq!(doc.sheet.match_by, MatchBy::Position);
        assert_eq!(doc.columns[1].kind, ScalarKind::Date);
        assert_eq!(doc.columns[1].column.expression(), Some("yyyy/MM/dd"));
        assert_eq!(doc.columns[1].column.title, "");

        let schema = doc.sheet_schema().unwrap();
        assert_eq!(schema.column("when").map(|c| c.position), Some(2));
    }

    #[test]
    fn test_dynamic_fields() {
        let binding = SchemaDocument::from_json(DOC).unwrap().binding().unwrap();
        let field = &binding.fields()[0];
        assert_eq!(field.kind(), ScalarKind::Text);

        let mut record = DynamicRecord::new();
        field.set(&mut record, Value::Text("x".into())).unwrap();
        assert_eq!(field.get(&record), Some(Value::Text("x".into())));
        assert!(field.set(&mut record, Value::Int(1)).is_err());

        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"name":"x"}"#);
    }

    #[test]
    fn test_invalid_document() {
        assert!(matches!(
            SchemaDocument::from_json(r#"{"columns": [{"field": "a"}]}"#),
            Err(Error::InvalidSchema(_))
        ));
        let empty = SchemaDocument::from_json(r#"{"columns": []}"#).unwrap();
        assert!(empty.binding().is_err());
    }
}
