//! Project settings persisted as YAML.
//!
//! Every field has a default, so a settings file only needs the keys it
//! changes.

use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::{
    codegen::CodegenOptions,
    csv_table::{CsvTable, RowFilter},
    import_log::LogLevel,
    naming::NamingConvention,
    pipeline::{ImportPipeline, ImportSource},
    schema::{self, ColumnRule, EnumDescriptor, EnumRegistry, NamingConfig},
    source::{DirectoryCache, SheetLookup, SheetRef, UrlTemplates},
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetEntry {
    /// Tab id (`gid`).
    pub id: String,
    pub name: String,
    /// Master name the table and record types derive from, e.g. `character`.
    pub table_name: String,
}

/// Enum made known to dynamic imports and schema resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnumEntry {
    pub namespace: String,
    pub name: String,
    pub variants: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub spreadsheet_id: String,
    pub sheets: Vec<SheetEntry>,
    pub ignore_rows: Vec<RowFilter>,
    pub ignore_columns: Vec<ColumnRule>,
    pub column_naming: NamingConvention,
    pub field_naming: NamingConvention,
    pub constant_naming: NamingConvention,
    pub namespace: String,
    pub enum_search_paths: Vec<String>,
    pub enums: Vec<EnumEntry>,
    pub sheet_lookup: SheetLookup,
    pub import_source: ImportSource,
    pub cache_dir: PathBuf,
    pub cache_encoding: Option<String>,
    pub script_dir: PathBuf,
    pub schema_dir: PathBuf,
    pub csv_dir: PathBuf,
    pub log_level: LogLevel,
}

impl Default for Settings {
    fn default() -> Self {
        let naming = NamingConfig::default();
        Self {
            spreadsheet_id: String::new(),
            sheets: Vec::new(),
            ignore_rows: Vec::new(),
            ignore_columns: vec![ColumnRule::contains("#")],
            column_naming: naming.column,
            field_naming: naming.field,
            constant_naming: naming.constant,
            namespace: String::new(),
            enum_search_paths: Vec::new(),
            enums: Vec::new(),
            sheet_lookup: SheetLookup::default(),
            import_source: ImportSource::default(),
            cache_dir: PathBuf::from("cache"),
            cache_encoding: None,
            script_dir: PathBuf::from("generated"),
            schema_dir: PathBuf::from("schemas"),
            csv_dir: PathBuf::from("csv"),
            log_level: LogLevel::default(),
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening settings file {path:?}"))?;
        let settings: Settings = serde_yaml::from_reader(BufReader::new(file))
            .with_context(|| format!("Parsing settings YAML {path:?}"))?;
        Ok(settings)
    }

    /// Loads `path` when given, otherwise the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| format!("Creating settings file {path:?}"))?;
        serde_yaml::to_writer(file, self).context("Writing settings YAML")
    }

    pub fn naming(&self) -> NamingConfig {
        NamingConfig {
            column: self.column_naming,
            field: self.field_naming,
            constant: self.constant_naming,
        }
    }

    pub fn csv_table(&self) -> CsvTable {
        CsvTable::new(self.ignore_rows.clone())
    }

    pub fn pipeline(&self) -> ImportPipeline {
        ImportPipeline::new(self.csv_table(), UrlTemplates::default())
            .with_lookup(self.sheet_lookup)
            .with_threshold(self.log_level)
            .with_source(self.import_source)
    }

    pub fn codegen_options(&self) -> CodegenOptions {
        CodegenOptions::new(self.namespace.clone())
    }

    pub fn enum_registry(&self) -> EnumRegistry {
        let mut registry = EnumRegistry::new(self.enum_search_paths.iter().cloned());
        for entry in &self.enums {
            registry.register(EnumDescriptor::new(
                &entry.namespace,
                &entry.name,
                entry.variants.iter().cloned(),
            ));
        }
        registry
    }

    pub fn cache(&self) -> Result<DirectoryCache> {
        DirectoryCache::new(&self.cache_dir).with_encoding(self.cache_encoding.as_deref())
    }

    /// Finds a configured sheet by tab name or table name.
    pub fn sheet(&self, name: &str) -> Result<&SheetEntry> {
        match self
            .sheets
            .iter()
            .find(|entry| entry.name == name || entry.table_name == name)
        {
            Some(entry) => Ok(entry),
            None => bail!("No sheet named '{name}' is configured"),
        }
    }

    /// Default location of a master's probed schema.
    pub fn schema_path(&self, master_name: &str) -> PathBuf {
        self.schema_dir.join(format!("{master_name}.yml"))
    }

    /// Table type name a sheet's snapshot and cache entry are stored under.
    pub fn table_type_name(&self, entry: &SheetEntry) -> String {
        let master = if entry.table_name.is_empty() {
            &entry.name
        } else {
            &entry.table_name
        };
        schema::table_type_name(master)
    }

    pub fn sheet_ref(&self, entry: &SheetEntry) -> SheetRef {
        SheetRef::new(&self.spreadsheet_id, &entry.id, &entry.name)
    }
}
