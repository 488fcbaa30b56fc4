pub mod binder;
pub mod cli;
pub mod codegen;
pub mod config;
pub mod csv_table;
pub mod error;
pub mod future;
pub mod import_log;
pub mod master;
pub mod naming;
pub mod output;
pub mod pipeline;
pub mod schema;
pub mod source;
pub mod table;

use std::{env, fs, path::Path, sync::OnceLock};

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{LevelFilter, debug, info, warn};
use similar::{ChangeTag, TextDiff};

pub use crate::{
    binder::{BindResult, CellReader, MasterRecord, Record, RecordBinder, SchemaBinder, TypedBinder, Value},
    error::{SheetError, SheetResult},
    future::{AsyncFuture, CancelToken, Promise},
    import_log::{ImportLog, LogLevel},
    master::MasterTable,
};

use crate::{
    cli::{Cli, Commands, InferenceArgs, OutputFormat},
    codegen::{CodegenOptions, SchemaCodeEmitter},
    config::Settings,
    csv_table::{CsvTable, RowFilter},
    output::OutputRules,
    schema::{ColumnRule, ColumnType, EnumRegistry, TableSchema},
    source::{SheetRef, UrlTemplates},
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("sheet_master", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let settings = Settings::load_or_default(cli.config.as_deref())
        .context("Loading settings")?;
    match cli.command {
        Commands::Probe(args) => handle_probe(&settings, &args),
        Commands::Generate(args) => handle_generate(&settings, &args),
        Commands::Import(args) => handle_import(&settings, &args),
        Commands::Url(args) => handle_url(&settings, &args),
        #[cfg(feature = "http")]
        Commands::Fetch(args) => handle_fetch(&settings, &args),
    }
}

fn handle_probe(settings: &Settings, args: &cli::ProbeArgs) -> Result<()> {
    info!("Probing '{}' as master '{}'", args.input.display(), args.name);
    let text = read_snapshot(&args.input)?;
    let sheet_name = args.sheet_name.as_deref().unwrap_or(&args.name);
    let schema = infer_schema(settings, &args.inference, &text, &args.name, sheet_name)?;
    let schema_path = args
        .schema
        .clone()
        .unwrap_or_else(|| settings.schema_path(&args.name));
    if let Some(parent) = schema_path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Creating schema directory {parent:?}"))?;
    }
    schema
        .save(&schema_path)
        .with_context(|| format!("Writing schema to {schema_path:?}"))?;
    info!(
        "Inferred {} column(s) for '{}' written to {:?}",
        schema.columns.len(),
        schema.table_name,
        schema_path
    );
    if !args.quiet {
        print!("{}", table::render_schema(&schema));
    }
    Ok(())
}

fn handle_generate(settings: &Settings, args: &cli::GenerateArgs) -> Result<()> {
    let mut schema = match (&args.schema, &args.input) {
        (Some(path), _) => {
            let mut schema = TableSchema::load(path)
                .with_context(|| format!("Loading schema from {path:?}"))?;
            apply_enum_overrides(&mut schema, &args.inference.enums)?;
            resolve_pending_enums(&mut schema, &settings.enum_registry());
            schema
        }
        (None, Some(input)) => {
            let name = args
                .name
                .as_deref()
                .context("--name is required when generating from --input")?;
            let text = read_snapshot(input)?;
            infer_schema(settings, &args.inference, &text, name, name)?
        }
        (None, None) => bail!("Either --input or --schema must be provided"),
    };
    if let Some(id) = &args.spreadsheet_id {
        schema.spreadsheet_id = id.clone();
    } else if schema.spreadsheet_id.is_empty() {
        schema.spreadsheet_id = settings.spreadsheet_id.clone();
    }
    if let Some(id) = &args.sheet_id {
        schema.sheet_id = id.clone();
    }

    let options = match &args.namespace {
        Some(namespace) => CodegenOptions::new(namespace.clone()),
        None => settings.codegen_options(),
    };
    let emitter = SchemaCodeEmitter::new(options);
    let files = emitter.emit(&schema);
    let out_dir = args.out.clone().unwrap_or_else(|| settings.script_dir.clone());

    if args.check {
        let mut drifted = Vec::new();
        for file in [&files.table, &files.record] {
            let path = out_dir.join(&file.file_name);
            let existing = fs::read_to_string(&path).unwrap_or_default();
            if existing != file.contents {
                print!("{}", unified_diff(&existing, &file.contents, &file.file_name));
                drifted.push(file.file_name.clone());
            }
        }
        if !drifted.is_empty() {
            bail!("Generated sources are out of date: {}", drifted.join(", "));
        }
        info!("Generated sources for '{}' are up to date", schema.table_name);
        return Ok(());
    }

    let rules = OutputRules::new()?;
    let written = output::write_generated(&rules, &out_dir, &schema, &files)
        .with_context(|| format!("Generating sources for '{}'", schema.table_name))?;
    info!(
        "Generated {} file(s) for '{}' in {:?}",
        written.len(),
        schema.table_name,
        out_dir
    );
    Ok(())
}

fn handle_import(settings: &Settings, args: &cli::ImportArgs) -> Result<()> {
    let text = read_snapshot(&args.input)?;
    let schema = match &args.schema {
        Some(path) => {
            let mut schema = TableSchema::load(path)
                .with_context(|| format!("Loading schema from {path:?}"))?;
            apply_enum_overrides(&mut schema, &args.inference.enums)?;
            resolve_pending_enums(&mut schema, &settings.enum_registry());
            schema
        }
        None => infer_schema(settings, &args.inference, &text, &args.name, &args.name)?,
    };
    let binder = SchemaBinder::new(schema.clone(), settings.enum_registry())?;
    let mut master = MasterTable::new(schema.table_name.clone(), binder);

    let threshold = args.log_level.unwrap_or(settings.log_level);
    let pipeline = pipeline::ImportPipeline::new(
        csv_table_for(settings, &args.inference),
        UrlTemplates::default(),
    )
    .with_threshold(threshold);
    let report = pipeline
        .import_from_csv(&mut master, &text)
        .with_context(|| format!("Importing {:?}", args.input))?;
    info!(
        "Imported {} record(s) from {} row(s) into '{}'",
        report.imported, report.rows, report.table_name
    );

    let selected: Vec<&Record> = match args.key {
        Some(key) => match master.get(key) {
            Some(record) => vec![record],
            None => bail!("No record with key {key} in '{}'", schema.table_name),
        },
        None => master.iter().collect(),
    };
    match args.format {
        OutputFormat::Table => print!("{}", table::render_records(&schema, selected)),
        OutputFormat::Json => {
            let values: Vec<serde_json::Value> =
                selected.iter().map(|record| record.to_json()).collect();
            let rendered =
                serde_json::to_string_pretty(&values).context("Serializing records to JSON")?;
            println!("{rendered}");
        }
    }
    Ok(())
}

fn handle_url(settings: &Settings, args: &cli::UrlArgs) -> Result<()> {
    let spreadsheet_id = args
        .spreadsheet_id
        .clone()
        .unwrap_or_else(|| settings.spreadsheet_id.clone());
    if spreadsheet_id.is_empty() {
        bail!("No spreadsheet id configured; pass --spreadsheet-id");
    }
    let lookup = args.lookup.unwrap_or(settings.sheet_lookup);
    let templates = UrlTemplates::default();

    let sheets: Vec<SheetRef> = if args.sheet_id.is_some() || args.sheet_name.is_some() {
        vec![SheetRef::new(
            spreadsheet_id.as_str(),
            args.sheet_id.clone().unwrap_or_default(),
            args.sheet_name.clone().unwrap_or_default(),
        )]
    } else {
        let entries = match &args.sheet {
            Some(name) => vec![settings.sheet(name)?],
            None => settings.sheets.iter().collect(),
        };
        entries
            .into_iter()
            .map(|entry| SheetRef {
                spreadsheet_id: spreadsheet_id.clone(),
                ..settings.sheet_ref(entry)
            })
            .collect()
    };
    if sheets.is_empty() {
        bail!("No sheets configured; pass --sheet-id or --sheet-name");
    }
    for sheet in &sheets {
        let label = if sheet.sheet_name.is_empty() {
            &sheet.sheet_id
        } else {
            &sheet.sheet_name
        };
        println!("{label}");
        println!("  export: {}", templates.export_url(lookup, sheet));
        println!("  edit:   {}", templates.edit_url(sheet));
    }
    Ok(())
}

#[cfg(feature = "http")]
fn handle_fetch(settings: &Settings, args: &cli::FetchArgs) -> Result<()> {
    let mut settings = settings.clone();
    if let Some(id) = &args.spreadsheet_id {
        settings.spreadsheet_id = id.clone();
    }
    if settings.spreadsheet_id.is_empty() {
        bail!("No spreadsheet id configured; pass --spreadsheet-id");
    }
    let entries: Vec<&config::SheetEntry> = match &args.sheet {
        Some(name) => vec![settings.sheet(name)?],
        None => settings.sheets.iter().collect(),
    };
    if entries.is_empty() {
        bail!("No sheets configured to fetch");
    }

    let dir = args.out.clone().unwrap_or_else(|| settings.csv_dir.clone());
    let rules = OutputRules::new()?;
    let pipeline = settings.pipeline();
    let fetcher = source::HttpFetcher::default();
    let cancel = CancelToken::new();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .context("Starting the fetch runtime")?;
    for entry in entries {
        let table_name = settings.table_type_name(entry);
        let sheet = settings.sheet_ref(entry);
        let path = runtime.block_on(pipeline.export_snapshot(
            &fetcher, &sheet, &cancel, &rules, &dir, &table_name,
        ))?;
        info!("Saved sheet '{}' to {path:?}", entry.name);
    }
    Ok(())
}

fn read_snapshot(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Reading CSV snapshot {path:?}"))
}

fn csv_table_for(settings: &Settings, args: &InferenceArgs) -> CsvTable {
    let mut filters = settings.ignore_rows.clone();
    filters.extend(args.ignore_lines.iter().copied().map(RowFilter::line));
    filters.extend(args.ignore_first_cells.iter().map(RowFilter::first_cell));
    CsvTable::new(filters)
}

fn infer_schema(
    settings: &Settings,
    args: &InferenceArgs,
    text: &str,
    master_name: &str,
    sheet_name: &str,
) -> Result<TableSchema> {
    let rows = csv_table_for(settings, args).parse(text, false);
    if rows.is_empty() {
        bail!("The snapshot has no header row");
    }
    let mut rules = settings.ignore_columns.clone();
    rules.extend(args.ignore_columns.iter().map(ColumnRule::contains));
    let mut naming = settings.naming();
    if let Some(column) = args.column_naming {
        naming.column = column;
    }
    debug!("Inferring schema with {} column rule(s)", rules.len());

    let mut schema = TableSchema::from_rows(master_name, sheet_name, &rows, &rules, &naming);
    schema.spreadsheet_id = settings.spreadsheet_id.clone();
    if let Ok(entry) = settings.sheet(master_name) {
        schema.sheet_id = entry.id.clone();
    }
    apply_enum_overrides(&mut schema, &args.enums)?;
    resolve_pending_enums(&mut schema, &settings.enum_registry());
    Ok(schema)
}

fn apply_enum_overrides(schema: &mut TableSchema, overrides: &[(String, String)]) -> Result<()> {
    for (header, enum_name) in overrides {
        let column = schema
            .column_mut(header)
            .with_context(|| format!("Column '{header}' not found for --enum override"))?;
        column.set_enum(enum_name.as_str());
    }
    Ok(())
}

/// Resolves enum columns that are not yet valid, warning about each failure.
fn resolve_pending_enums(schema: &mut TableSchema, registry: &EnumRegistry) {
    for column in schema
        .columns
        .iter_mut()
        .filter(|column| column.column_type == ColumnType::Enum && column.exported && !column.valid)
    {
        if let Err(err) = column.resolve_enum(registry) {
            warn!("Column '{}' left out of generation: {err}", column.source_name);
        }
    }
}

fn unified_diff(old: &str, new: &str, name: &str) -> String {
    let diff = TextDiff::from_lines(old, new);
    let mut rendered = format!("--- {name} (on disk)\n+++ {name} (generated)\n");
    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => "-",
            ChangeTag::Insert => "+",
            ChangeTag::Equal => continue,
        };
        rendered.push_str(sign);
        rendered.push_str(change.as_str().unwrap_or_default());
        if change.missing_newline() {
            rendered.push('\n');
        }
    }
    rendered
}
