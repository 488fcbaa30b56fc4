//! Column schema model, type inference and enum resolution.
//!
//! A [`TableSchema`] is derived once from a sheet's header row and its first
//! data row. Users may then edit it (most commonly switching a column to an
//! enum type) and persist it as YAML; code generation and dynamic imports
//! both consume the edited schema.
//!
//! Column indices are assigned from header position and never renumbered, so
//! excluded columns still occupy their slot and generated offsets stay valid.

use std::{
    collections::{BTreeMap, HashSet},
    fmt,
    fs::File,
    io::BufReader,
    path::Path,
    str::FromStr,
};

use anyhow::{Context, Result, anyhow};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::{
    csv_table::Row,
    error::{SheetError, SheetResult},
    naming::{self, NamingConvention},
};

/// Header text that marks the key column.
pub const KEY_COLUMN_NAME: &str = "id";
/// Name of the synthesized column-count column.
pub const MAX_COLUMN_NAME: &str = "max";
const CONSTANT_PREFIX: &str = "column_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    String,
    Int,
    Float,
    Bool,
    Enum,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::String => "string",
            ColumnType::Int => "int",
            ColumnType::Float => "float",
            ColumnType::Bool => "bool",
            ColumnType::Enum => "enum",
        }
    }

    /// Infers a type from one sample cell. First match wins: empty, integer,
    /// float, boolean, otherwise string.
    pub fn infer(sample: &str) -> Self {
        let trimmed = sample.trim();
        if trimmed.is_empty() {
            ColumnType::String
        } else if trimmed.parse::<i64>().is_ok() {
            ColumnType::Int
        } else if trimmed.parse::<f64>().is_ok() {
            ColumnType::Float
        } else if parse_bool_literal(trimmed).is_some() {
            ColumnType::Bool
        } else {
            ColumnType::String
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnType {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "string" | "str" => Ok(ColumnType::String),
            "int" | "integer" => Ok(ColumnType::Int),
            "float" | "double" => Ok(ColumnType::Float),
            "bool" | "boolean" => Ok(ColumnType::Bool),
            "enum" => Ok(ColumnType::Enum),
            _ => Err(anyhow!(
                "Unknown column type '{value}'. Supported types: string, int, float, bool, enum"
            )),
        }
    }
}

/// Canonical boolean literals, case-insensitive.
pub fn parse_bool_literal(value: &str) -> Option<bool> {
    let trimmed = value.trim();
    if trimmed.eq_ignore_ascii_case("true") {
        Some(true)
    } else if trimmed.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// Excludes a column from export when its header matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ColumnRule {
    /// Header contains the literal substring.
    Contains { value: String },
}

impl ColumnRule {
    pub fn contains(value: impl Into<String>) -> Self {
        ColumnRule::Contains {
            value: value.into(),
        }
    }

    pub fn matches(&self, header: &str) -> bool {
        match self {
            ColumnRule::Contains { value } => header.contains(value.as_str()),
        }
    }
}

/// Naming conventions used to derive identifiers from header text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamingConfig {
    /// Convention the sheet's headers are written in.
    pub column: NamingConvention,
    pub field: NamingConvention,
    pub constant: NamingConvention,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            column: NamingConvention::Snake,
            field: NamingConvention::Snake,
            constant: NamingConvention::UpperSnake,
        }
    }
}

impl NamingConfig {
    pub fn field_name(&self, header: &str) -> String {
        let converted = naming::convert(header, self.column, self.field);
        naming::sanitize_identifier(&converted).into_owned()
    }

    pub fn constant_name(&self, header: &str) -> String {
        let prefixed = format!("{CONSTANT_PREFIX}{header}");
        let converted = naming::convert(&prefixed, self.column, self.constant);
        naming::sanitize_identifier(&converted).into_owned()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub index: usize,
    pub source_name: String,
    pub exported: bool,
    pub valid: bool,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_type_name: Option<String>,
    /// Module path the resolved enum lives in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_namespace: Option<String>,
    #[serde(default)]
    pub field_name: String,
    #[serde(default)]
    pub constant_name: String,
}

impl ColumnSchema {
    /// Schema for a column that produces no field.
    pub fn excluded(index: usize, source_name: &str) -> Self {
        Self {
            index,
            source_name: source_name.to_string(),
            exported: false,
            valid: false,
            column_type: ColumnType::String,
            enum_type_name: None,
            enum_namespace: None,
            field_name: String::new(),
            constant_name: String::new(),
        }
    }

    pub fn new(index: usize, source_name: &str, sample: &str, naming: &NamingConfig) -> Self {
        Self {
            index,
            source_name: source_name.to_string(),
            exported: true,
            valid: true,
            column_type: ColumnType::infer(sample),
            enum_type_name: None,
            enum_namespace: None,
            field_name: naming.field_name(source_name),
            constant_name: naming.constant_name(source_name),
        }
    }

    /// Exported and resolvable; only these columns reach generated code.
    pub fn is_emitted(&self) -> bool {
        self.exported && self.valid
    }

    pub fn is_key(&self) -> bool {
        self.exported && self.source_name == KEY_COLUMN_NAME
    }

    /// Overrides the inferred type. Choosing [`ColumnType::Enum`] here leaves
    /// the column invalid until [`ColumnSchema::set_enum`] resolves a type.
    pub fn set_type(&mut self, column_type: ColumnType) {
        self.column_type = column_type;
        if column_type == ColumnType::Enum {
            self.valid = false;
        } else {
            self.valid = true;
            self.enum_type_name = None;
            self.enum_namespace = None;
        }
    }

    /// Switches the column to an enum type that must still be resolved.
    pub fn set_enum(&mut self, type_name: impl Into<String>) {
        self.column_type = ColumnType::Enum;
        self.enum_type_name = Some(type_name.into());
        self.enum_namespace = None;
        self.valid = false;
    }

    /// Resolves the pending enum name against `registry`. On success the
    /// name is canonicalized to the registered type's name.
    pub fn resolve_enum(&mut self, registry: &EnumRegistry) -> SheetResult<()> {
        if self.column_type != ColumnType::Enum {
            return Ok(());
        }
        let requested = self.enum_type_name.clone().unwrap_or_default();
        match registry.resolve(&requested) {
            Some(descriptor) => {
                self.enum_type_name = Some(descriptor.name.clone());
                self.enum_namespace = Some(descriptor.namespace.clone());
                self.valid = true;
                Ok(())
            }
            None => {
                self.valid = false;
                Err(SheetError::UnresolvedEnum(requested))
            }
        }
    }

    /// Rust type name used in generated declarations.
    pub fn rust_type(&self) -> &str {
        match self.column_type {
            ColumnType::String => "String",
            ColumnType::Int => "i64",
            ColumnType::Float => "f64",
            ColumnType::Bool => "bool",
            ColumnType::Enum => self.enum_type_name.as_deref().unwrap_or("()"),
        }
    }
}

/// Enumeration known to the host application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDescriptor {
    pub namespace: String,
    pub name: String,
    pub variants: Vec<String>,
}

impl EnumDescriptor {
    pub fn new<I, S>(namespace: &str, name: &str, variants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            variants: variants.into_iter().map(Into::into).collect(),
        }
    }

    pub fn qualified_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}::{}", self.namespace, self.name)
        }
    }

    /// Case-sensitive variant lookup.
    pub fn parse(&self, value: &str) -> Option<&str> {
        self.variants
            .iter()
            .find(|variant| variant.as_str() == value)
            .map(String::as_str)
    }

    pub fn default_variant(&self) -> Option<&str> {
        self.variants.first().map(String::as_str)
    }
}

/// Registry of enum types searchable by name.
///
/// The host registers its enums up front; lookups try each search namespace
/// in order, then a fully qualified name.
#[derive(Debug, Clone, Default)]
pub struct EnumRegistry {
    types: BTreeMap<String, EnumDescriptor>,
    search_namespaces: Vec<String>,
}

impl EnumRegistry {
    pub fn new<I, S>(search_namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            types: BTreeMap::new(),
            search_namespaces: search_namespaces.into_iter().map(Into::into).collect(),
        }
    }

    pub fn register(&mut self, descriptor: EnumDescriptor) -> &mut Self {
        self.types.insert(descriptor.qualified_name(), descriptor);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn resolve(&self, name: &str) -> Option<&EnumDescriptor> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        self.search_namespaces
            .iter()
            .find_map(|namespace| {
                let key = if namespace.is_empty() {
                    name.to_string()
                } else {
                    format!("{namespace}::{name}")
                };
                self.types.get(&key)
            })
            .or_else(|| self.types.get(name))
    }
}

/// Derives column schemas from a header row and one sample row.
///
/// Blank headers and headers matched by any rule are excluded. A column
/// whose field or constant name collides after conversion, including with the
/// reserved `max` constant, gets an `_<index>` suffix.
pub fn infer(
    header: &[String],
    sample: Option<&[String]>,
    rules: &[ColumnRule],
    naming: &NamingConfig,
) -> Vec<ColumnSchema> {
    let mut seen_fields = HashSet::new();
    let mut seen_constants = HashSet::from([naming.constant_name(MAX_COLUMN_NAME)]);
    header
        .iter()
        .enumerate()
        .map(|(index, name)| {
            if !is_exported_header(name, rules) {
                debug!("Column {index} '{name}' excluded from export");
                return ColumnSchema::excluded(index, name);
            }
            let sample_value = sample
                .and_then(|row| row.get(index))
                .map(String::as_str)
                .unwrap_or("");
            let mut column = ColumnSchema::new(index, name, sample_value, naming);
            let field_taken = !seen_fields.insert(column.field_name.clone());
            let constant_taken = !seen_constants.insert(column.constant_name.clone());
            if field_taken || constant_taken {
                warn!(
                    "Column '{name}' converts to a taken name ('{}' / '{}'); suffixing with its index",
                    column.field_name, column.constant_name
                );
                column.field_name = format!("{}_{index}", column.field_name);
                column.constant_name = format!("{}_{index}", column.constant_name);
                seen_fields.insert(column.field_name.clone());
                seen_constants.insert(column.constant_name.clone());
            }
            column
        })
        .collect()
}

fn is_exported_header(header: &str, rules: &[ColumnRule]) -> bool {
    !header.trim().is_empty() && !rules.iter().any(|rule| rule.matches(header))
}

/// Everything code generation and dynamic import need to know about a tab.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Generated table type name, e.g. `CharacterMaster`.
    pub table_name: String,
    pub sheet_name: String,
    #[serde(default)]
    pub spreadsheet_id: String,
    #[serde(default)]
    pub sheet_id: String,
    pub columns: Vec<ColumnSchema>,
    /// Synthesized column carrying the total header width.
    pub max_column: ColumnSchema,
}

impl TableSchema {
    /// Builds a schema from parsed rows where `rows[0]` is the header.
    pub fn from_rows(
        master_name: &str,
        sheet_name: &str,
        rows: &[Row],
        rules: &[ColumnRule],
        naming: &NamingConfig,
    ) -> Self {
        let header = rows.first().map(Vec::as_slice).unwrap_or_default();
        let sample = rows.get(1).map(Vec::as_slice);
        let columns = infer(header, sample, rules, naming);
        let width = columns.len().to_string();
        Self {
            table_name: table_type_name(master_name),
            sheet_name: sheet_name.to_string(),
            spreadsheet_id: String::new(),
            sheet_id: String::new(),
            max_column: ColumnSchema::new(columns.len(), MAX_COLUMN_NAME, &width, naming),
            columns,
        }
    }

    pub fn record_name(&self) -> String {
        format!("{}Data", self.table_name)
    }

    pub fn key_column(&self) -> Option<&ColumnSchema> {
        self.columns.iter().find(|column| column.is_key())
    }

    pub fn column(&self, source_name: &str) -> Option<&ColumnSchema> {
        self.columns
            .iter()
            .find(|column| column.source_name == source_name)
    }

    pub fn column_mut(&mut self, source_name: &str) -> Option<&mut ColumnSchema> {
        self.columns
            .iter_mut()
            .find(|column| column.source_name == source_name)
    }

    pub fn emitted_columns(&self) -> impl Iterator<Item = &ColumnSchema> {
        self.columns.iter().filter(|column| column.is_emitted())
    }

    /// One past the last emitted index, so fixed-width buffers indexed by
    /// column offset fit every emitted field.
    pub fn emitted_width(&self) -> usize {
        self.emitted_columns()
            .map(|column| column.index + 1)
            .max()
            .unwrap_or(0)
    }

    /// Resolves every enum column, returning the names that failed.
    pub fn resolve_enums(&mut self, registry: &EnumRegistry) -> Vec<String> {
        self.columns
            .iter_mut()
            .filter_map(|column| match column.resolve_enum(registry) {
                Err(SheetError::UnresolvedEnum(name)) => Some(name),
                _ => None,
            })
            .collect()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| format!("Creating schema file {path:?}"))?;
        serde_yaml::to_writer(file, self).context("Writing schema YAML")
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Serializing schema to YAML string")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening schema file {path:?}"))?;
        let reader = BufReader::new(file);
        let schema: TableSchema = serde_yaml::from_reader(reader).context("Parsing schema YAML")?;
        Ok(schema)
    }
}

/// `character` or `Character` becomes `CharacterMaster`.
pub fn table_type_name(master_name: &str) -> String {
    let snake = format!("{master_name}_master");
    naming::convert(&snake, NamingConvention::Snake, NamingConvention::UpperCamel).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Row {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn inference_order_prefers_int_then_float_then_bool() {
        assert_eq!(ColumnType::infer(""), ColumnType::String);
        assert_eq!(ColumnType::infer("3"), ColumnType::Int);
        assert_eq!(ColumnType::infer("3.5"), ColumnType::Float);
        assert_eq!(ColumnType::infer("True"), ColumnType::Bool);
        assert_eq!(ColumnType::infer("Amy"), ColumnType::String);
    }

    #[test]
    fn infer_excludes_blank_and_ruled_headers_but_keeps_indices() {
        let header = row(&["id", "#debug", " ", "name"]);
        let sample = row(&["1", "x", "y", "Amy"]);
        let rules = vec![ColumnRule::contains("#")];
        let columns = infer(&header, Some(&sample), &rules, &NamingConfig::default());

        assert_eq!(columns.len(), 4);
        assert!(!columns[1].exported);
        assert!(!columns[2].exported);
        assert_eq!(columns[3].index, 3);
        assert_eq!(columns[3].field_name, "name");
        assert_eq!(columns[3].constant_name, "COLUMN_NAME");
        assert_eq!(columns[0].column_type, ColumnType::Int);
    }

    #[test]
    fn missing_sample_cells_infer_as_string() {
        let header = row(&["id", "note"]);
        let sample = row(&["1"]);
        let columns = infer(&header, Some(&sample), &[], &NamingConfig::default());
        assert_eq!(columns[1].column_type, ColumnType::String);
    }

    #[test]
    fn colliding_field_names_are_suffixed() {
        let header = row(&["hp", "HP"]);
        let naming = NamingConfig {
            column: NamingConvention::UpperSnake,
            ..NamingConfig::default()
        };
        let columns = infer(&header, None, &[], &naming);
        assert_eq!(columns[0].field_name, "hp");
        assert_eq!(columns[1].field_name, "hp_1");
    }

    #[test]
    fn enum_override_is_invalid_until_resolved() {
        let mut registry = EnumRegistry::new(["game::types"]);
        registry.register(EnumDescriptor::new("game::types", "Gender", ["Man", "Woman"]));

        let mut column = ColumnSchema::new(2, "gender", "Man", &NamingConfig::default());
        column.set_enum("Gender");
        assert!(!column.valid);

        column.resolve_enum(&registry).expect("resolves");
        assert!(column.valid);
        assert_eq!(column.enum_namespace.as_deref(), Some("game::types"));

        column.set_enum("Missing");
        assert_eq!(
            column.resolve_enum(&registry),
            Err(SheetError::UnresolvedEnum("Missing".to_string()))
        );
        assert!(!column.valid);

        column.set_type(ColumnType::String);
        assert!(column.valid);
        assert!(column.enum_type_name.is_none());
    }

    #[test]
    fn table_schema_names_and_max_column() {
        let rows = vec![row(&["id", "name", "age"]), row(&["1", "Amy", "30"])];
        let schema = TableSchema::from_rows(
            "character",
            "Character",
            &rows,
            &[],
            &NamingConfig::default(),
        );
        assert_eq!(schema.table_name, "CharacterMaster");
        assert_eq!(schema.record_name(), "CharacterMasterData");
        assert_eq!(schema.max_column.source_name, "max");
        assert_eq!(schema.max_column.constant_name, "COLUMN_MAX");
        assert_eq!(schema.max_column.index, 3);
        assert_eq!(schema.key_column().map(|c| c.index), Some(0));
        assert_eq!(schema.emitted_width(), 3);
    }

    #[test]
    fn schema_survives_yaml_round_trip() {
        let rows = vec![row(&["id", "name"]), row(&["1", "Amy"])];
        let schema =
            TableSchema::from_rows("item", "Item", &rows, &[], &NamingConfig::default());
        let yaml = schema.to_yaml_string().expect("yaml");
        let parsed: TableSchema = serde_yaml::from_str(&yaml).expect("parse yaml");
        assert_eq!(parsed, schema);
    }
}
