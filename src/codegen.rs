//! Emits the two Rust source files generated for each table.
//!
//! The table file declares the `MasterTable` alias and the sheet ids; the
//! record file declares the record struct, one index constant per emitted
//! column, the trailing `*_MAX` constant and the binding impls. Both files
//! are meant to sit side by side as sibling modules named after
//! [`GeneratedFiles::table_file_name`] and [`GeneratedFiles::record_file_name`].
//!
//! Emission is pure: the same schema and options always produce the same
//! bytes.

use std::fmt::Write as _;

use heck::ToSnakeCase;
use itertools::Itertools;

use crate::schema::{ColumnSchema, ColumnType, TableSchema};

const HEADER: &str = "// Generated by sheet-master. Do not edit by hand; regenerate instead.";
const INDENT: &str = "    ";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodegenOptions {
    /// Module path the generated items are wrapped in, e.g. `master` or
    /// `game::master`. Empty means no wrapping. Enums living in this module
    /// (with or without a `crate::` prefix) are not imported.
    pub namespace: String,
}

impl CodegenOptions {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    fn segments(&self) -> Vec<&str> {
        self.namespace
            .split("::")
            .map(str::trim)
            .filter(|segment| !segment.is_empty() && *segment != "crate")
            .collect()
    }

    fn normalized_namespace(&self) -> String {
        self.segments().join("::")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    pub file_name: String,
    pub contents: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFiles {
    pub table: GeneratedFile,
    pub record: GeneratedFile,
}

impl GeneratedFiles {
    pub fn table_file_name(schema: &TableSchema) -> String {
        format!("{}.rs", module_name(&schema.table_name))
    }

    pub fn record_file_name(schema: &TableSchema) -> String {
        format!("{}.rs", module_name(&schema.record_name()))
    }
}

fn module_name(type_name: &str) -> String {
    type_name.to_snake_case()
}

#[derive(Debug, Clone, Default)]
pub struct SchemaCodeEmitter {
    options: CodegenOptions,
}

impl SchemaCodeEmitter {
    pub fn new(options: CodegenOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CodegenOptions {
        &self.options
    }

    pub fn emit(&self, schema: &TableSchema) -> GeneratedFiles {
        GeneratedFiles {
            table: GeneratedFile {
                file_name: GeneratedFiles::table_file_name(schema),
                contents: self.emit_table(schema),
            },
            record: GeneratedFile {
                file_name: GeneratedFiles::record_file_name(schema),
                contents: self.emit_record(schema),
            },
        }
    }

    pub fn emit_table(&self, schema: &TableSchema) -> String {
        let record = schema.record_name();
        let segments = self.options.segments();
        let record_path = {
            let mut path = "super::".repeat(segments.len() + 1);
            path.push_str(&module_name(&record));
            for segment in &segments {
                path.push_str("::");
                path.push_str(segment);
            }
            path
        };

        let mut body = CodeWriter::default();
        body.line("use sheet_master::{MasterTable, TypedBinder};");
        body.blank();
        body.line(&format!("use {record_path}::{record};"));
        body.blank();
        body.line(&format!(
            "pub const TABLE_NAME: &str = {:?};",
            schema.table_name
        ));
        body.line(&format!("pub const SHEET_NAME: &str = {:?};", schema.sheet_name));
        body.line(&format!(
            "pub const SPREADSHEET_ID: &str = {:?};",
            schema.spreadsheet_id
        ));
        body.line(&format!("pub const SHEET_ID: &str = {:?};", schema.sheet_id));
        body.blank();
        body.line(&format!(
            "pub type {} = MasterTable<TypedBinder<{record}>>;",
            schema.table_name
        ));
        body.blank();
        body.line(&format!("pub fn new_table() -> {} {{", schema.table_name));
        body.line(&format!(
            "{INDENT}MasterTable::new(TABLE_NAME, TypedBinder::default())"
        ));
        body.line(&format!("{INDENT}{INDENT}.with_source(SPREADSHEET_ID, SHEET_ID)"));
        body.line(&format!(
            "{INDENT}{INDENT}.with_sheet_name(SHEET_NAME)"
        ));
        body.line("}");

        wrap(&segments, body)
    }

    pub fn emit_record(&self, schema: &TableSchema) -> String {
        let record = schema.record_name();
        let own_namespace = self.options.normalized_namespace();
        let columns: Vec<&ColumnSchema> = schema.emitted_columns().collect();
        let key_field = schema
            .key_column()
            .filter(|column| column.is_emitted())
            .map(|column| column.field_name.clone());

        let mut body = CodeWriter::default();
        body.line("use std::fmt;");
        body.blank();
        body.line("use sheet_master::{BindResult, CellReader, MasterRecord};");
        for import in enum_imports(&columns, &own_namespace) {
            body.line(&import);
        }
        body.blank();

        for column in &columns {
            body.line(&format!(
                "pub const {}: usize = {};",
                column.constant_name, column.index
            ));
        }
        body.line(&format!(
            "pub const {}: usize = {};",
            schema.max_column.constant_name,
            schema.emitted_width()
        ));
        body.blank();

        body.line("#[derive(Debug, Clone, PartialEq)]");
        body.line(&format!("pub struct {record} {{"));
        for column in &columns {
            body.line(&format!(
                "{INDENT}pub {}: {},",
                column.field_name,
                field_type(column, key_field.as_deref())
            ));
        }
        body.line("}");
        body.blank();

        body.line(&format!("impl MasterRecord for {record} {{"));
        body.line(&format!(
            "{INDENT}fn bind(cells: &mut CellReader<'_>) -> BindResult<Self> {{"
        ));
        body.line(&format!("{INDENT}{INDENT}Ok(Self {{"));
        for column in &columns {
            body.line(&format!(
                "{INDENT}{INDENT}{INDENT}{}: {},",
                column.field_name,
                bind_expression(column, key_field.as_deref())
            ));
        }
        body.line(&format!("{INDENT}{INDENT}}})"));
        body.line(&format!("{INDENT}}}"));
        body.blank();
        body.line(&format!("{INDENT}fn key(&self) -> i64 {{"));
        match &key_field {
            Some(field) => body.line(&format!("{INDENT}{INDENT}self.{field}")),
            None => body.line(&format!("{INDENT}{INDENT}0")),
        }
        body.line(&format!("{INDENT}}}"));
        body.line("}");
        body.blank();

        body.line(&format!("impl fmt::Display for {record} {{"));
        body.line(&format!(
            "{INDENT}fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {{"
        ));
        body.line(&display_statement(&record, &columns));
        body.line(&format!("{INDENT}}}"));
        body.line("}");

        wrap(&self.options.segments(), body)
    }
}

/// One `use` per referenced enum namespace other than the record's own.
fn enum_imports(columns: &[&ColumnSchema], own_namespace: &str) -> Vec<String> {
    let enum_columns: Vec<(&str, &str)> = columns
        .iter()
        .filter(|column| column.column_type == ColumnType::Enum)
        .filter_map(|column| {
            let name = column.enum_type_name.as_deref()?;
            let namespace = column.enum_namespace.as_deref().unwrap_or_default();
            Some((namespace, name))
        })
        .collect();

    enum_columns
        .iter()
        .map(|(namespace, _)| *namespace)
        .filter(|namespace| !namespace.is_empty() && !is_own_namespace(namespace, own_namespace))
        .unique()
        .sorted()
        .map(|namespace| {
            let names = enum_columns
                .iter()
                .filter(|(ns, _)| *ns == namespace)
                .map(|(_, name)| *name)
                .unique()
                .sorted()
                .collect::<Vec<_>>();
            if names.len() == 1 {
                format!("use {namespace}::{};", names[0])
            } else {
                format!("use {namespace}::{{{}}};", names.join(", "))
            }
        })
        .collect()
}

fn is_own_namespace(namespace: &str, own_namespace: &str) -> bool {
    !own_namespace.is_empty()
        && (namespace == own_namespace
            || namespace.strip_prefix("crate::") == Some(own_namespace))
}

fn is_key(column: &ColumnSchema, key_field: Option<&str>) -> bool {
    column.is_key() && key_field == Some(column.field_name.as_str())
}

fn field_type<'a>(column: &'a ColumnSchema, key_field: Option<&str>) -> &'a str {
    if is_key(column, key_field) {
        "i64"
    } else {
        column.rust_type()
    }
}

fn bind_expression(column: &ColumnSchema, key_field: Option<&str>) -> String {
    let index = &column.constant_name;
    if is_key(column, key_field) {
        return format!("cells.get_int({index})");
    }
    match column.column_type {
        ColumnType::String => format!("cells.get_string({index})"),
        ColumnType::Int => format!("cells.get_int({index})"),
        ColumnType::Float => format!("cells.get_float({index})"),
        ColumnType::Bool => format!("cells.get_bool({index})"),
        ColumnType::Enum => format!(
            "cells.get_enum({index}, {}::default())",
            column.rust_type()
        ),
    }
}

fn display_statement(record: &str, columns: &[&ColumnSchema]) -> String {
    let pattern = columns
        .iter()
        .map(|column| {
            let placeholder = if column.column_type == ColumnType::Enum {
                "{:?}"
            } else {
                "{}"
            };
            format!("{}={placeholder}", column.field_name.trim_start_matches("r#"))
        })
        .join(", ");
    let mut statement = format!("{INDENT}{INDENT}write!(f, \"{record} [{pattern}]\"");
    for column in columns {
        let _ = write!(statement, ", self.{}", column.field_name);
    }
    statement.push(')');
    statement
}

#[derive(Default)]
struct CodeWriter {
    lines: Vec<String>,
}

impl CodeWriter {
    fn line(&mut self, text: &str) {
        self.lines.push(text.to_string());
    }

    fn blank(&mut self) {
        self.lines.push(String::new());
    }
}

/// Nests the body in one `pub mod` block per namespace segment.
fn wrap(segments: &[&str], body: CodeWriter) -> String {
    let mut output = String::new();
    output.push_str(HEADER);
    output.push_str("\n\n");
    for (depth, segment) in segments.iter().enumerate() {
        let _ = writeln!(output, "{}pub mod {segment} {{", INDENT.repeat(depth));
    }
    let indent = INDENT.repeat(segments.len());
    for line in &body.lines {
        if line.is_empty() {
            output.push('\n');
        } else {
            let _ = writeln!(output, "{indent}{line}");
        }
    }
    for depth in (0..segments.len()).rev() {
        let _ = writeln!(output, "{}}}", INDENT.repeat(depth));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        csv_table::Row,
        schema::{ColumnRule, EnumDescriptor, EnumRegistry, NamingConfig},
    };

    fn rows(lines: &[&[&str]]) -> Vec<Row> {
        lines
            .iter()
            .map(|cells| cells.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    fn character_schema() -> TableSchema {
        let rows = rows(&[
            &["id", "name", "#debug", "hp", "rate", "alive"],
            &["1", "Amy", "x", "30", "0.5", "true"],
        ]);
        TableSchema::from_rows(
            "character",
            "Character",
            &rows,
            &[ColumnRule::contains("#")],
            &NamingConfig::default(),
        )
    }

    #[test]
    fn record_skips_excluded_columns_but_keeps_their_slot() {
        let emitter = SchemaCodeEmitter::default();
        let code = emitter.emit_record(&character_schema());
        assert!(code.contains("pub const COLUMN_ID: usize = 0;"));
        assert!(code.contains("pub const COLUMN_HP: usize = 3;"));
        assert!(code.contains("pub const COLUMN_MAX: usize = 6;"));
        assert!(!code.contains("debug"));
        assert!(code.contains("    pub rate: f64,"));
        assert!(code.contains("            alive: cells.get_bool(COLUMN_ALIVE),"));
        assert!(code.contains("        self.id\n"));
    }

    #[test]
    fn max_constant_is_one_past_last_emitted_index() {
        let rows = rows(&[&["id", "name", "#tail"], &["1", "Amy", "x"]]);
        let schema = TableSchema::from_rows(
            "item",
            "Item",
            &rows,
            &[ColumnRule::contains("#")],
            &NamingConfig::default(),
        );
        let code = SchemaCodeEmitter::default().emit_record(&schema);
        assert!(code.contains("pub const COLUMN_MAX: usize = 2;"));
    }

    #[test]
    fn header_named_max_does_not_shadow_the_width_constant() {
        let rows = rows(&[&["id", "max", "name"], &["1", "10", "Amy"]]);
        let schema =
            TableSchema::from_rows("item", "Item", &rows, &[], &NamingConfig::default());
        let code = SchemaCodeEmitter::default().emit_record(&schema);
        assert_eq!(code.matches("pub const COLUMN_MAX: usize").count(), 1);
        assert!(code.contains("pub const COLUMN_MAX_1: usize = 1;"));
        assert!(code.contains("pub const COLUMN_MAX: usize = 3;"));
        assert!(code.contains("max_1: cells.get_int(COLUMN_MAX_1),"));
    }

    #[test]
    fn table_declares_alias_and_ids() {
        let mut schema = character_schema();
        schema.spreadsheet_id = "abc".to_string();
        schema.sheet_id = "42".to_string();
        let code = SchemaCodeEmitter::default().emit_table(&schema);
        assert!(code.contains(
            "pub type CharacterMaster = MasterTable<TypedBinder<CharacterMasterData>>;"
        ));
        assert!(code.contains("use super::character_master_data::CharacterMasterData;"));
        assert!(code.contains("pub const SPREADSHEET_ID: &str = \"abc\";"));
        assert!(!code.contains("pub mod"));
    }

    #[test]
    fn namespace_wraps_both_files() {
        let emitter = SchemaCodeEmitter::new(CodegenOptions::new("game::master"));
        let schema = character_schema();
        let table = emitter.emit_table(&schema);
        assert!(table.contains("pub mod game {\n    pub mod master {\n"));
        assert!(table.contains(
            "use super::super::super::character_master_data::game::master::CharacterMasterData;"
        ));
        assert!(table.ends_with("    }\n}\n"));
        let record = emitter.emit_record(&schema);
        assert!(record.contains("        pub struct CharacterMasterData {"));
    }

    #[test]
    fn enum_imports_are_deduplicated_and_skip_own_namespace() {
        let mut registry = EnumRegistry::new(["crate::types", "crate::master"]);
        registry
            .register(EnumDescriptor::new("crate::types", "Gender", ["Man", "Woman"]))
            .register(EnumDescriptor::new("crate::types", "Rarity", ["Common"]))
            .register(EnumDescriptor::new("crate::master", "Slot", ["Head"]));

        let rows = rows(&[
            &["id", "gender", "rarity", "slot", "alt_gender"],
            &["1", "Man", "Common", "Head", "Woman"],
        ]);
        let mut schema =
            TableSchema::from_rows("item", "Item", &rows, &[], &NamingConfig::default());
        for (column, enum_name) in [
            ("gender", "Gender"),
            ("rarity", "Rarity"),
            ("slot", "Slot"),
            ("alt_gender", "Gender"),
        ] {
            if let Some(column) = schema.column_mut(column) {
                column.set_enum(enum_name);
            }
        }
        assert!(schema.resolve_enums(&registry).is_empty());

        let emitter = SchemaCodeEmitter::new(CodegenOptions::new("master"));
        let code = emitter.emit_record(&schema);
        assert_eq!(code.matches("use crate::types::{Gender, Rarity};").count(), 1);
        assert!(!code.contains("use crate::master::"));
        assert!(code.contains("gender: cells.get_enum(COLUMN_GENDER, Gender::default()),"));
        assert!(code.contains("gender={:?}"));
    }

    #[test]
    fn file_names_follow_type_names() {
        let files = SchemaCodeEmitter::default().emit(&character_schema());
        assert_eq!(files.table.file_name, "character_master.rs");
        assert_eq!(files.record.file_name, "character_master_data.rs");
    }
}
