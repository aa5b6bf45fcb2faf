// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Record schemas describing the columns of a source's rows.
//!
//! ```json
//! {
//!   "type": "record",
//!   "name": "access_log",
//!   "fields": [
//!     {"name": "path", "type": "string"},
//!     {"name": "status", "type": "int"},
//!     {"name": "latency", "type": ["null", "double"]}
//!   ],
//!   "metadata": {"service": "frontend"}
//! }
//! ```
//!
//! Columns map to fields by position. A field whose type is a union with
//! `"null"` accepts an empty column.

use serde::Deserialize;
use serde_json::{Map, Number, Value};

use crate::errors::ParseError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldType {
    String,
    Long,
    Int,
    Double,
    Float,
    Boolean,
}

impl FieldType {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "string" => Some(FieldType::String),
            "long" => Some(FieldType::Long),
            "int" => Some(FieldType::Int),
            "double" => Some(FieldType::Double),
            "float" => Some(FieldType::Float),
            "boolean" => Some(FieldType::Boolean),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Long => "long",
            FieldType::Int => "int",
            FieldType::Double => "double",
            FieldType::Float => "float",
            FieldType::Boolean => "boolean",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub ty: FieldType,
    pub nullable: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RecordSchema {
    pub name: String,
    pub fields: Vec<Field>,
    /// Static fields attached to every record of this schema
    pub metadata: Map<String, Value>,
}

#[derive(Deserialize)]
struct RawSchema {
    #[serde(rename = "type")]
    kind: String,
    name: String,
    fields: Vec<RawField>,
    #[serde(default)]
    metadata: Map<String, Value>,
}

#[derive(Deserialize)]
struct RawField {
    name: String,
    #[serde(rename = "type")]
    ty: Value,
}

impl RecordSchema {
    pub fn parse(json: &str) -> Result<Self, ParseError> {
        let raw: RawSchema =
            serde_json::from_str(json).map_err(|e| ParseError::Schema(e.to_string()))?;
        if raw.kind != "record" {
            return Err(ParseError::Schema(format!(
                "expected a record schema, got '{}'",
                raw.kind
            )));
        }
        if raw.fields.is_empty() {
            return Err(ParseError::Schema(format!(
                "record '{}' has no fields",
                raw.name
            )));
        }

        let fields = raw
            .fields
            .into_iter()
            .map(parse_field)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name: raw.name,
            fields,
            metadata: raw.metadata,
        })
    }

    /// Converts the columns of one row to a record keyed by field name.
    pub fn convert_row(
        &self,
        row: usize,
        columns: &[String],
    ) -> Result<Map<String, Value>, ParseError> {
        if columns.len() != self.fields.len() {
            return Err(ParseError::ColumnCount {
                row,
                expected: self.fields.len(),
                found: columns.len(),
            });
        }

        let mut record = Map::with_capacity(self.fields.len());
        for (field, column) in self.fields.iter().zip(columns) {
            let value = convert_value(field, column).ok_or_else(|| ParseError::FieldValue {
                row,
                field: field.name.clone(),
                value: column.clone(),
                expected: field.ty.name(),
            })?;
            record.insert(field.name.clone(), value);
        }
        Ok(record)
    }
}

fn parse_field(raw: RawField) -> Result<Field, ParseError> {
    let unknown = || {
        ParseError::Schema(format!(
            "field '{}' has unsupported type {}",
            raw.name, raw.ty
        ))
    };
    let from_name = |name: &str| FieldType::from_name(name).ok_or_else(unknown);

    let (ty, nullable) = match &raw.ty {
        Value::String(name) => (from_name(name)?, false),
        Value::Array(branches) => {
            let mut ty = None;
            let mut nullable = false;
            for branch in branches {
                match branch.as_str() {
                    Some("null") => nullable = true,
                    Some(name) if ty.is_none() => ty = Some(from_name(name)?),
                    _ => return Err(unknown()),
                }
            }
            (ty.ok_or_else(unknown)?, nullable)
        }
        _ => return Err(unknown()),
    };

    Ok(Field {
        name: raw.name,
        ty,
        nullable,
    })
}

fn convert_value(field: &Field, column: &str) -> Option<Value> {
    if column.is_empty() && field.nullable {
        return Some(Value::Null);
    }
    let trimmed = column.trim();

    match field.ty {
        FieldType::String => Some(Value::String(column.to_string())),
        FieldType::Long => trimmed.parse::<i64>().ok().map(Value::from),
        FieldType::Int => trimmed.parse::<i32>().ok().map(Value::from),
        FieldType::Double | FieldType::Float => trimmed
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number),
        FieldType::Boolean => match trimmed.to_ascii_lowercase().as_str() {
            "true" | "1" => Some(Value::Bool(true)),
            "false" | "0" => Some(Value::Bool(false)),
            _ => None,
        },
    }
}
