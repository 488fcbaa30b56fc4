//! Writing generated sources and CSV snapshots.
//!
//! Every precondition is checked before the first byte is written, so a
//! rejected generation leaves the output directory untouched.

use std::{
    fs::{self, File},
    io::BufWriter,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use log::info;
use regex::{Regex, RegexBuilder};

use crate::{
    codegen::GeneratedFiles,
    csv_table::{self, Row},
    error::{SheetError, SheetResult},
    schema::TableSchema,
};

/// Control characters, characters no file system accepts, reserved device
/// names, and a trailing dot or space.
const INVALID_FILE_NAME: &str = concat!(
    r#"[\x00-\x1f<>:"/\\|?*]"#,
    r"|^(CON|PRN|AUX|NUL|COM[0-9]|LPT[0-9]|CLOCK\$)(\.|$)",
    r"|[\. ]$",
);

const INVALID_PATH_CHARS: &[char] = &['"', '<', '>', '|'];

/// Compiled output validation rules.
#[derive(Debug, Clone)]
pub struct OutputRules {
    invalid_file_name: Regex,
}

impl OutputRules {
    pub fn new() -> Result<Self> {
        let invalid_file_name = RegexBuilder::new(INVALID_FILE_NAME)
            .case_insensitive(true)
            .build()
            .context("Compiling file name validation pattern")?;
        Ok(Self { invalid_file_name })
    }

    pub fn validate_directory(&self, path: &Path) -> SheetResult<()> {
        let text = path.to_string_lossy();
        if text
            .chars()
            .any(|ch| ch.is_control() || INVALID_PATH_CHARS.contains(&ch))
        {
            return Err(SheetError::InvalidOutputPath(path.to_path_buf()));
        }
        Ok(())
    }

    pub fn validate_file_name(&self, name: &str) -> SheetResult<()> {
        if name.is_empty() || self.invalid_file_name.is_match(name) {
            return Err(SheetError::InvalidFileName(name.to_string()));
        }
        Ok(())
    }
}

/// Writes both generated files into `dir`.
///
/// Fails without writing anything when the directory or either file name is
/// invalid, or when the schema has no exported `id` column.
pub fn write_generated(
    rules: &OutputRules,
    dir: &Path,
    schema: &TableSchema,
    files: &GeneratedFiles,
) -> Result<Vec<PathBuf>> {
    rules.validate_directory(dir)?;
    for file in [&files.table, &files.record] {
        rules.validate_file_name(&file.file_name)?;
    }
    if !schema.key_column().is_some_and(|column| column.is_emitted()) {
        return Err(SheetError::MissingKeyColumn(schema.table_name.clone()).into());
    }

    fs::create_dir_all(dir).with_context(|| format!("Creating output directory {dir:?}"))?;
    let mut written = Vec::with_capacity(2);
    for file in [&files.table, &files.record] {
        let path = dir.join(&file.file_name);
        fs::write(&path, &file.contents)
            .with_context(|| format!("Writing generated source {path:?}"))?;
        info!("Wrote {path:?}");
        written.push(path);
    }
    Ok(written)
}

/// Writes `rows` (header included) to `<dir>/<table_name>.csv`.
pub fn write_snapshot(
    rules: &OutputRules,
    dir: &Path,
    table_name: &str,
    rows: &[Row],
) -> Result<PathBuf> {
    rules.validate_directory(dir)?;
    let file_name = format!("{table_name}.csv");
    rules.validate_file_name(&file_name)?;

    fs::create_dir_all(dir).with_context(|| format!("Creating snapshot directory {dir:?}"))?;
    let path = dir.join(file_name);
    let file = File::create(&path).with_context(|| format!("Creating snapshot {path:?}"))?;
    csv_table::write_rows(BufWriter::new(file), rows)?;
    info!("Wrote snapshot {path:?} ({} row(s))", rows.len());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::{
        codegen::SchemaCodeEmitter,
        schema::{ColumnRule, NamingConfig},
    };

    fn rules() -> OutputRules {
        OutputRules::new().expect("rules compile")
    }

    fn rows(lines: &[&[&str]]) -> Vec<Row> {
        lines
            .iter()
            .map(|cells| cells.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    #[test]
    fn rejects_reserved_and_malformed_file_names() {
        let rules = rules();
        for name in ["CON", "con.rs", "LPT1.rs", "a:b.rs", "name.", "trailing ", "tab\there"] {
            assert!(rules.validate_file_name(name).is_err(), "{name} should be rejected");
        }
        for name in ["character_master.rs", "Item.csv", "console.rs"] {
            assert!(rules.validate_file_name(name).is_ok(), "{name} should be accepted");
        }
    }

    #[test]
    fn rejects_directories_with_invalid_characters() {
        let rules = rules();
        assert!(rules.validate_directory(Path::new("out/<gen>")).is_err());
        assert!(rules.validate_directory(Path::new("out/generated")).is_ok());
    }

    #[test]
    fn missing_key_column_writes_nothing() {
        let dir = tempdir().expect("temp dir");
        let target = dir.path().join("generated");
        let schema = TableSchema::from_rows(
            "item",
            "Item",
            &rows(&[&["code", "name"], &["1", "Sword"]]),
            &[],
            &NamingConfig::default(),
        );
        let files = SchemaCodeEmitter::default().emit(&schema);
        let err = write_generated(&rules(), &target, &schema, &files).expect_err("rejected");
        assert_eq!(
            err.downcast_ref::<SheetError>(),
            Some(&SheetError::MissingKeyColumn("ItemMaster".to_string()))
        );
        assert!(!target.exists());
    }

    #[test]
    fn excluded_key_column_counts_as_missing() {
        let dir = tempdir().expect("temp dir");
        let schema = TableSchema::from_rows(
            "item",
            "Item",
            &rows(&[&["id", "name"], &["1", "Sword"]]),
            &[ColumnRule::contains("id")],
            &NamingConfig::default(),
        );
        let files = SchemaCodeEmitter::default().emit(&schema);
        assert!(write_generated(&rules(), dir.path(), &schema, &files).is_err());
    }

    #[test]
    fn writes_both_sources() {
        let dir = tempdir().expect("temp dir");
        let schema = TableSchema::from_rows(
            "item",
            "Item",
            &rows(&[&["id", "name"], &["1", "Sword"]]),
            &[],
            &NamingConfig::default(),
        );
        let files = SchemaCodeEmitter::default().emit(&schema);
        let written = write_generated(&rules(), dir.path(), &schema, &files).expect("written");
        assert_eq!(written.len(), 2);
        let record = fs::read_to_string(dir.path().join("item_master_data.rs")).expect("read");
        assert_eq!(record, files.record.contents);
    }

    #[test]
    fn snapshot_reparses_to_the_same_rows() {
        let dir = tempdir().expect("temp dir");
        let data = rows(&[&["id", "name"], &["1", ""], &["2", "Bob"]]);
        let path = write_snapshot(&rules(), dir.path(), "ItemMaster", &data).expect("snapshot");
        assert!(path.ends_with("ItemMaster.csv"));
        let text = fs::read_to_string(path).expect("read");
        assert_eq!(csv_table::parse(&text, false, &[]), data);
    }
}
