mod common;

use std::time::Duration;

use common::{CHARACTER_CSV, Reply, ScriptedFetcher, TestWorkspace};
use sheet_master::{
    CancelToken, MasterTable, SchemaBinder, SheetError,
    config::Settings,
    csv_table::{self, CsvTable, RowFilter},
    output::{self, OutputRules},
    pipeline::{ImportPipeline, ImportSource},
    schema::{EnumRegistry, NamingConfig, TableSchema},
    source::{DirectoryCache, SIGN_IN_MARKER, SheetLookup, UrlTemplates},
};

const EXPORT_URL: &str = "https://docs.google.com/spreadsheets/d/book/export?format=csv&gid=0";

fn character_table() -> MasterTable<SchemaBinder> {
    let rows = csv_table::parse(CHARACTER_CSV, false, &[]);
    let schema = TableSchema::from_rows(
        "character",
        "Character",
        &rows,
        &[],
        &NamingConfig::default(),
    );
    let binder = SchemaBinder::new(schema.clone(), EnumRegistry::default()).expect("binder");
    MasterTable::new(schema.table_name, binder).with_source("book", "0")
}

fn pipeline() -> ImportPipeline {
    ImportPipeline::new(CsvTable::default(), UrlTemplates::default())
}

#[tokio::test]
async fn imports_downloaded_sheet() {
    let fetcher = ScriptedFetcher::new().reply(EXPORT_URL, Reply::Body(CHARACTER_CSV.to_string()));
    let mut table = character_table();
    let report = pipeline()
        .import_from_spreadsheet(&mut table, &fetcher, &CancelToken::new())
        .await
        .expect("import");
    assert_eq!(report.imported, 2);
    assert_eq!(fetcher.requests(), vec![EXPORT_URL.to_string()]);
}

#[tokio::test]
async fn sign_in_page_cancels_before_binding() {
    let mut table = character_table();
    let seeded = ScriptedFetcher::new().reply(EXPORT_URL, Reply::Body(CHARACTER_CSV.to_string()));
    pipeline()
        .import_from_spreadsheet(&mut table, &seeded, &CancelToken::new())
        .await
        .expect("seed import");

    let page = format!("<html><script src=\"{SIGN_IN_MARKER}challenge\"></script></html>");
    let fetcher = ScriptedFetcher::new().reply(EXPORT_URL, Reply::Body(page));
    let err = pipeline()
        .import_from_spreadsheet(&mut table, &fetcher, &CancelToken::new())
        .await
        .expect_err("sign-in page rejected");
    assert_eq!(err, SheetError::SignInRequired);
    assert!(err.is_fetch_failure());
    assert_eq!(table.count(), 2, "previous contents stay in place");
}

#[tokio::test]
async fn transport_failure_surfaces_as_error() {
    let fetcher = ScriptedFetcher::new();
    let mut table = character_table();
    let err = pipeline()
        .import_from_spreadsheet(&mut table, &fetcher, &CancelToken::new())
        .await
        .expect_err("no reply scripted");
    assert!(matches!(err, SheetError::Transport(_)));
    assert!(table.is_empty());
}

#[tokio::test]
async fn cancel_while_fetch_is_pending_stops_the_import() {
    let fetcher = ScriptedFetcher::new().reply(EXPORT_URL, Reply::Hold);
    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let mut table = character_table();
    let err = pipeline()
        .import_from_spreadsheet(&mut table, &fetcher, &cancel)
        .await
        .expect_err("canceled");
    assert_eq!(err, SheetError::Canceled);
    assert!(table.is_empty());

    let pending = fetcher.take_pending();
    assert_eq!(pending.len(), 1);
    pending[0]
        .complete(CHARACTER_CSV.to_string())
        .expect("late body is still accepted by the promise");
    assert!(table.is_empty());
}

#[tokio::test]
async fn held_fetch_resolved_from_another_task_completes_import() {
    let fetcher = ScriptedFetcher::new().reply(EXPORT_URL, Reply::Hold);
    let resolver = fetcher.clone();
    tokio::spawn(async move {
        loop {
            let pending = resolver.take_pending();
            if let Some(promise) = pending.into_iter().next() {
                promise
                    .complete(CHARACTER_CSV.to_string())
                    .expect("complete held fetch");
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    });

    let mut table = character_table();
    let report = pipeline()
        .import_from_spreadsheet(&mut table, &fetcher, &CancelToken::new())
        .await
        .expect("import");
    assert_eq!(report.imported, 2);
}

#[tokio::test]
async fn batch_import_reports_each_table() {
    let second_url = "https://docs.google.com/spreadsheets/d/book/export?format=csv&gid=9";
    let fetcher = ScriptedFetcher::new()
        .reply(EXPORT_URL, Reply::Body(CHARACTER_CSV.to_string()))
        .reply(
            second_url,
            Reply::Fail(SheetError::Transport("503".to_string())),
        );
    let mut tables = vec![character_table(), {
        let rows = csv_table::parse(CHARACTER_CSV, false, &[]);
        let schema =
            TableSchema::from_rows("detail", "Detail", &rows, &[], &NamingConfig::default());
        let binder = SchemaBinder::new(schema.clone(), EnumRegistry::default()).expect("binder");
        MasterTable::new(schema.table_name, binder).with_source("book", "9")
    }];

    let outcomes = pipeline()
        .import_all(&mut tables, &fetcher, &CancelToken::new())
        .await;
    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].as_ref().map(|report| report.imported), Ok(2));
    assert_eq!(
        outcomes[1].as_ref().map(|report| report.imported),
        Err(&SheetError::Transport("503".to_string()))
    );
    assert_eq!(tables[0].count(), 2);
    assert!(tables[1].is_empty());
}

#[tokio::test]
async fn override_changes_the_requested_spreadsheet() {
    let url = "https://docs.google.com/spreadsheets/d/other/gviz/tq?tqx=out:csv&sheet=Character";
    let fetcher = ScriptedFetcher::new().reply(url, Reply::Body(CHARACTER_CSV.to_string()));
    let mut table = character_table().with_sheet_name("Character");
    table.override_spreadsheet_id("other");
    pipeline()
        .with_lookup(SheetLookup::Name)
        .import_from_spreadsheet(&mut table, &fetcher, &CancelToken::new())
        .await
        .expect("import");
    assert_eq!(fetcher.requests(), vec![url.to_string()]);
}

#[tokio::test]
async fn downloaded_rows_snapshot_and_reimport_from_cache() {
    let workspace = TestWorkspace::new();
    let fetcher = ScriptedFetcher::new().reply(
        EXPORT_URL,
        Reply::Body("id,name,age\n#,comment,\n1,Amy,30\n2,Bob,25\n".to_string()),
    );
    let pipeline = ImportPipeline::new(
        CsvTable::new(vec![RowFilter::first_cell("#")]),
        UrlTemplates::default(),
    );
    let sheet = character_table().sheet_ref();
    let rows = pipeline
        .fetch_rows(&fetcher, &sheet, &CancelToken::new())
        .await
        .expect("fetch rows");
    assert_eq!(rows.len(), 3);

    let rules = OutputRules::new().expect("rules");
    output::write_snapshot(&rules, workspace.path(), "CharacterMaster", &rows).expect("snapshot");

    let mut table = character_table();
    let cache = DirectoryCache::new(workspace.path());
    let report = pipeline
        .import_from_cache(&mut table, &cache)
        .expect("cached import");
    assert_eq!(report.imported, 2);
    assert_eq!(table.get_by_index(1).map(|record| record.key()), Some(2));
}

#[test]
fn missing_cache_entry_is_a_missing_resource() {
    let workspace = TestWorkspace::new();
    let mut table = character_table();
    let err = pipeline()
        .import_from_cache(&mut table, &DirectoryCache::new(workspace.path()))
        .expect_err("nothing cached");
    assert!(matches!(err, SheetError::MissingResource(_)));
}

#[test]
fn empty_sheet_text_keeps_previous_records() {
    let mut table = character_table();
    pipeline()
        .import_from_csv(&mut table, CHARACTER_CSV)
        .expect("seed import");

    for text in ["", "\n  \n"] {
        let err = pipeline()
            .import_from_csv(&mut table, text)
            .expect_err("empty text rejected");
        assert_eq!(err, SheetError::EmptySheet("CharacterMaster".to_string()));
        assert_eq!(table.count(), 2);
        assert_eq!(table.get(1).map(|record| record.key()), Some(1));
    }
}

#[tokio::test]
async fn exported_snapshot_feeds_a_cached_source_import() {
    let workspace = TestWorkspace::new();
    let fetcher = ScriptedFetcher::new().reply(EXPORT_URL, Reply::Body(CHARACTER_CSV.to_string()));
    let rules = OutputRules::new().expect("rules");
    let sheet = character_table().sheet_ref();
    let path = pipeline()
        .export_snapshot(
            &fetcher,
            &sheet,
            &CancelToken::new(),
            &rules,
            workspace.path(),
            "CharacterMaster",
        )
        .await
        .expect("snapshot written");
    assert_eq!(path, workspace.path().join("CharacterMaster.csv"));
    assert_eq!(fetcher.requests().len(), 1);

    let cached = pipeline().with_source(ImportSource::Cached);
    let mut table = character_table();
    let report = cached
        .import(
            &mut table,
            &fetcher,
            &DirectoryCache::new(workspace.path()),
            &CancelToken::new(),
        )
        .await
        .expect("cached import");
    assert_eq!(report.imported, 2);
    assert_eq!(fetcher.requests().len(), 1, "cached source does not fetch");
}

#[tokio::test]
async fn spreadsheet_source_fetches_instead_of_reading_the_cache() {
    let workspace = TestWorkspace::new();
    workspace.write("CharacterMaster.csv", "id,name,age\n9,Zed,1\n");
    let fetcher = ScriptedFetcher::new().reply(EXPORT_URL, Reply::Body(CHARACTER_CSV.to_string()));
    let mut table = character_table();
    let report = pipeline()
        .with_source(ImportSource::Spreadsheet)
        .import(
            &mut table,
            &fetcher,
            &DirectoryCache::new(workspace.path()),
            &CancelToken::new(),
        )
        .await
        .expect("spreadsheet import");
    assert_eq!(report.imported, 2);
    assert_eq!(fetcher.requests(), vec![EXPORT_URL.to_string()]);
    assert!(table.get(9).is_none());
}

#[tokio::test]
async fn configured_cached_source_reads_the_cache_directory() {
    let workspace = TestWorkspace::new();
    workspace.write("CharacterMaster.csv", CHARACTER_CSV);
    let settings = Settings {
        import_source: ImportSource::Cached,
        cache_dir: workspace.path().to_path_buf(),
        ..Settings::default()
    };
    let pipeline = settings.pipeline();
    assert_eq!(pipeline.source(), ImportSource::Cached);

    let fetcher = ScriptedFetcher::new();
    let mut table = character_table();
    let cache = settings.cache().expect("cache");
    let report = pipeline
        .import(&mut table, &fetcher, &cache, &CancelToken::new())
        .await
        .expect("cached import");
    assert_eq!(report.imported, 2);
    assert!(fetcher.requests().is_empty());
}

#[tokio::test]
async fn empty_download_writes_no_snapshot() {
    let workspace = TestWorkspace::new();
    let fetcher = ScriptedFetcher::new().reply(EXPORT_URL, Reply::Body(String::new()));
    let rules = OutputRules::new().expect("rules");
    let sheet = character_table().sheet_ref();
    let err = pipeline()
        .export_snapshot(
            &fetcher,
            &sheet,
            &CancelToken::new(),
            &rules,
            workspace.path(),
            "CharacterMaster",
        )
        .await
        .expect_err("nothing to write");
    assert!(err.to_string().contains("empty"));
    assert!(!workspace.path().join("CharacterMaster.csv").exists());
}
