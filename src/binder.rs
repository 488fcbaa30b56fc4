//! Row-to-record binding.
//!
//! [`CellReader`] does the per-cell decoding shared by every record kind:
//! bounds checks, the float-to-int fallback, enum lookup, and logging of each
//! recovered failure. Record kinds plug into a [`MasterTable`] through
//! [`RecordBinder`]; generated record types implement [`MasterRecord`] and
//! use [`TypedBinder`], while [`SchemaBinder`] binds any table described by a
//! [`TableSchema`] into dynamic [`Record`]s.
//!
//! [`MasterTable`]: crate::master::MasterTable

use std::{any, fmt, marker::PhantomData, str::FromStr};

use anyhow::Result;
use serde::Serialize;

use crate::{
    error::{SheetError, SheetResult},
    import_log::ImportLog,
    schema::{ColumnType, EnumDescriptor, EnumRegistry, TableSchema, parse_bool_literal},
};

/// Result of binding one record. Errors abort the whole import.
pub type BindResult<T> = Result<T>;

/// Typed view over one row's cells that logs every recovered failure.
pub struct CellReader<'a> {
    row: &'a [String],
    log: &'a mut ImportLog,
}

impl<'a> CellReader<'a> {
    pub fn new(row: &'a [String], log: &'a mut ImportLog) -> Self {
        Self { row, log }
    }

    pub fn row(&self) -> &[String] {
        self.row
    }

    pub fn log(&mut self) -> &mut ImportLog {
        self.log
    }

    fn cell(&mut self, index: usize) -> Option<&'a str> {
        match self.row.get(index) {
            Some(cell) => Some(cell.as_str()),
            None => {
                self.log.out_of_range(index);
                None
            }
        }
    }

    pub fn get_string(&mut self, index: usize) -> String {
        self.cell(index).map(str::to_string).unwrap_or_default()
    }

    /// Parses an integer, falling back to a truncated float for cells such
    /// as `3.0` that sheet exports produce for whole numbers.
    pub fn get_int(&mut self, index: usize) -> i64 {
        let Some(raw) = self.cell(index) else {
            return 0;
        };
        let trimmed = raw.trim();
        if let Ok(value) = trimmed.parse::<i64>() {
            return value;
        }
        if let Ok(value) = trimmed.parse::<f64>() {
            let truncated = value.trunc() as i64;
            self.log.implicit_cast(index, raw, truncated);
            return truncated;
        }
        self.log.parse_failed("int", index, raw);
        0
    }

    pub fn get_float(&mut self, index: usize) -> f64 {
        let Some(raw) = self.cell(index) else {
            return 0.0;
        };
        match raw.trim().parse::<f64>() {
            Ok(value) => value,
            Err(_) => {
                self.log.parse_failed("float", index, raw);
                0.0
            }
        }
    }

    pub fn get_bool(&mut self, index: usize) -> bool {
        let Some(raw) = self.cell(index) else {
            return false;
        };
        match parse_bool_literal(raw) {
            Some(value) => value,
            None => {
                self.log.parse_failed("bool", index, raw);
                false
            }
        }
    }

    /// Parses a statically known enum, returning `default` on failure.
    ///
    /// `E::from_str` is expected to match variant names case-sensitively.
    pub fn get_enum<E: FromStr>(&mut self, index: usize, default: E) -> E {
        let Some(raw) = self.cell(index) else {
            return default;
        };
        match raw.parse::<E>() {
            Ok(value) => value,
            Err(_) => {
                let type_name = any::type_name::<E>().rsplit("::").next().unwrap_or("?");
                self.log
                    .parse_failed(&format!("enum({type_name})"), index, raw);
                default
            }
        }
    }

    /// Parses a registered enum by variant name.
    pub fn get_registered_enum(&mut self, index: usize, descriptor: &EnumDescriptor) -> String {
        let fallback = descriptor.default_variant().unwrap_or_default().to_string();
        let Some(raw) = self.cell(index) else {
            return fallback;
        };
        match descriptor.parse(raw) {
            Some(variant) => variant.to_string(),
            None => {
                self.log
                    .parse_failed(&format!("enum({})", descriptor.name), index, raw);
                fallback
            }
        }
    }
}

/// Record type that knows how to bind itself from a row.
///
/// Generated record types implement this.
pub trait MasterRecord: Sized + fmt::Display {
    fn bind(cells: &mut CellReader<'_>) -> BindResult<Self>;
    fn key(&self) -> i64;
}

/// Binding capability injected into a [`MasterTable`](crate::master::MasterTable).
///
/// `pre_import` and `post_import` run around each successful import pass and
/// are the place to build secondary indices.
pub trait RecordBinder {
    type Record: fmt::Display;

    fn bind(&self, cells: &mut CellReader<'_>) -> Result<Self::Record>;

    fn key(&self, record: &Self::Record) -> i64;

    fn pre_import(&mut self) {}

    fn post_import(&mut self, _records: &[Self::Record]) {}
}

/// Binder for statically typed records.
pub struct TypedBinder<R> {
    _record: PhantomData<fn() -> R>,
}

impl<R> Default for TypedBinder<R> {
    fn default() -> Self {
        Self {
            _record: PhantomData,
        }
    }
}

impl<R> fmt::Debug for TypedBinder<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypedBinder<{}>", any::type_name::<R>())
    }
}

impl<R: MasterRecord> RecordBinder for TypedBinder<R> {
    type Record = R;

    fn bind(&self, cells: &mut CellReader<'_>) -> Result<R> {
        R::bind(cells)
    }

    fn key(&self, record: &R) -> i64 {
        record.key()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Enum(String),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Enum(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) | Value::Enum(s) => f.write_str(s),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// Dynamically bound record: the key plus fields in column order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    #[serde(skip)]
    name: String,
    key: i64,
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn key(&self) -> i64 {
        self.key
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
    }

    pub fn fields(&self) -> &[(String, Value)] {
        &self.fields
    }

    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .fields
            .iter()
            .map(|(name, value)| {
                let json = serde_json::to_value(value).unwrap_or(serde_json::Value::Null);
                (name.clone(), json)
            })
            .collect();
        serde_json::Value::Object(map)
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [", self.name)?;
        for (idx, (name, value)) in self.fields.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}={value}")?;
        }
        f.write_str("]")
    }
}

/// Binds rows of any table described by a [`TableSchema`].
///
/// The key column always binds as an integer whatever its inferred type.
#[derive(Debug, Clone)]
pub struct SchemaBinder {
    schema: TableSchema,
    enums: EnumRegistry,
    key_index: usize,
    record_name: String,
}

impl SchemaBinder {
    /// Fails when the schema has no exported `id` column.
    pub fn new(schema: TableSchema, enums: EnumRegistry) -> SheetResult<Self> {
        let key_index = schema
            .key_column()
            .map(|column| column.index)
            .ok_or_else(|| SheetError::MissingKeyColumn(schema.table_name.clone()))?;
        let record_name = schema.record_name();
        Ok(Self {
            schema,
            enums,
            key_index,
            record_name,
        })
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }
}

impl RecordBinder for SchemaBinder {
    type Record = Record;

    fn bind(&self, cells: &mut CellReader<'_>) -> Result<Record> {
        let mut fields = Vec::new();
        let mut key = None;
        for column in self.schema.emitted_columns() {
            if column.index == self.key_index {
                let id = cells.get_int(column.index);
                key = Some(id);
                fields.push((column.field_name.clone(), Value::Int(id)));
                continue;
            }
            let value = match column.column_type {
                ColumnType::String => Value::String(cells.get_string(column.index)),
                ColumnType::Int => Value::Int(cells.get_int(column.index)),
                ColumnType::Float => Value::Float(cells.get_float(column.index)),
                ColumnType::Bool => Value::Bool(cells.get_bool(column.index)),
                ColumnType::Enum => {
                    let name = column.enum_type_name.as_deref().unwrap_or_default();
                    let descriptor = self
                        .enums
                        .resolve(name)
                        .ok_or_else(|| SheetError::UnresolvedEnum(name.to_string()))?;
                    Value::Enum(cells.get_registered_enum(column.index, descriptor))
                }
            };
            fields.push((column.field_name.clone(), value));
        }
        let key = key.ok_or_else(|| SheetError::MissingKeyColumn(self.schema.table_name.clone()))?;
        Ok(Record {
            name: self.record_name.clone(),
            key,
            fields,
        })
    }

    fn key(&self, record: &Record) -> i64 {
        record.key
    }
}
