//! End-to-end pipeline tests against local files and SQLite extracts

use extract_loader::{
    CreateMode, ExtractPipeline, IngestionWarning, LoadOptions, LoaderError, LocalFetcher, RunSummary,
    SchemaDocument, SourceLocation, SqliteStore, Strategy, TableStore, TemporalFormats,
};
use rusqlite::types::Value;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const INT_TEXT_SCHEMA: &str = r#"{"name":"t","columns":[{"name":"a","type":"INT"},{"name":"b"}]}"#;

fn row_wise() -> LoadOptions {
    LoadOptions {
        strategy: Strategy::RowWise,
        ..Default::default()
    }
}

fn output(dir: &TempDir) -> PathBuf {
    dir.path().join("output.hyper")
}

async fn run(
    dir: &TempDir,
    schema: &str,
    csv: &[(&str, &str)],
    options: LoadOptions,
    mode: CreateMode,
) -> extract_loader::Result<RunSummary> {
    for (name, content) in csv {
        std::fs::write(dir.path().join(name), content).unwrap();
    }
    let files: Vec<String> = csv.iter().map(|(name, _)| name.to_string()).collect();
    let doc = SchemaDocument::from_json_str(schema)?;
    let pipeline = ExtractPipeline::new(options)?;
    let fetcher = LocalFetcher::new(dir.path());
    let path = output(dir);

    pipeline
        .run(&doc, &files, &SourceLocation::default(), &fetcher, || {
            SqliteStore::open(&path, mode)
        })
        .await
}

fn rows(path: &Path, table: &str) -> Vec<Vec<Value>> {
    SqliteStore::open(path, CreateMode::Create)
        .unwrap()
        .read_rows(table)
        .unwrap()
}

fn int_text(rows: &[(i64, &str)]) -> Vec<Vec<Value>> {
    rows.iter()
        .map(|(a, b)| vec![Value::Integer(*a), Value::Text(b.to_string())])
        .collect()
}

#[tokio::test]
async fn test_int_and_text_rows() {
    for options in [LoadOptions::default(), row_wise()] {
        let dir = TempDir::new().unwrap();
        let summary = run(&dir, INT_TEXT_SCHEMA, &[("in.csv", "1,x\n2,y\n")], options, CreateMode::Create)
            .await
            .unwrap();

        assert!(summary.created);
        assert_eq!(summary.table, "t");
        assert_eq!(summary.rows_ingested(), 2);
        assert_eq!(rows(&output(&dir), "t"), int_text(&[(1, "x"), (2, "y")]));
    }
}

#[tokio::test]
async fn test_extra_cell_is_dropped_with_warning() {
    let dir = TempDir::new().unwrap();
    let summary = run(&dir, INT_TEXT_SCHEMA, &[("in.csv", "1,x,extra\n")], row_wise(), CreateMode::Create)
        .await
        .unwrap();

    let report = &summary.reports[0];
    assert_eq!(report.rows_ingested, 1);
    assert_eq!(
        report.warnings,
        vec![IngestionWarning::ColumnCountMismatch {
            row: 1,
            expected: 2,
            found: 3
        }]
    );
    assert_eq!(rows(&output(&dir), "t"), int_text(&[(1, "x")]));
}

#[tokio::test]
async fn test_bad_integer_aborts_the_run() {
    let dir = TempDir::new().unwrap();
    let err = run(&dir, INT_TEXT_SCHEMA, &[("in.csv", "abc,x\n2,y\n")], row_wise(), CreateMode::Create)
        .await
        .unwrap_err();

    match err {
        LoaderError::Coercion { row, column, value, .. } => {
            assert_eq!(row, 1);
            assert_eq!(column, "a");
            assert_eq!(value, "abc");
        }
        other => panic!("unexpected error: {other}"),
    }

    // the store was closed on the error path; the table exists and is empty
    let store = SqliteStore::open(output(&dir), CreateMode::Create).unwrap();
    assert!(store.table_exists("t").unwrap());
    assert_eq!(store.row_count("t").unwrap(), 0);
}

fn staged() -> LoadOptions {
    LoadOptions {
        staging: true,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_bad_integer_aborts_every_strategy() {
    for options in [LoadOptions::default(), staged(), row_wise()] {
        let label = format!("{:?} staging={}", options.strategy, options.staging);
        let dir = TempDir::new().unwrap();
        let err = run(&dir, INT_TEXT_SCHEMA, &[("in.csv", "abc,x\n")], options, CreateMode::Create)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("abc"), "{label}: {err}");
        assert!(
            matches!(err, LoaderError::Store(_) | LoaderError::Coercion { .. }),
            "{label}: {err}"
        );
        let store = SqliteStore::open(output(&dir), CreateMode::Create).unwrap();
        assert_eq!(store.row_count("t").unwrap(), 0, "{label}");
        assert!(!store.table_exists("t__staging").unwrap(), "{label}");
    }
}

#[tokio::test]
async fn test_bulk_strategies_reject_malformed_typed_cells() {
    let schema = r#"{"name":"t","columns":[
        {"name":"f","type":"BOOLEAN"},
        {"name":"n","type":"NUMERIC","precision":3,"scale":1}
    ]}"#;
    for options in [LoadOptions::default(), staged()] {
        for (csv, bad) in [("yes,1.5\nmaybe,2.0\n", "maybe"), ("yes,12abc\n", "12abc"), ("no,1.25\n", "1.25")] {
            let dir = TempDir::new().unwrap();
            let err = run(&dir, schema, &[("in.csv", csv)], options.clone(), CreateMode::Create)
                .await
                .unwrap_err();

            assert!(matches!(err, LoaderError::Store(ref msg) if msg.contains(bad)), "{err}");
            assert!(rows(&output(&dir), "t").is_empty());
        }

        let dir = TempDir::new().unwrap();
        run(&dir, schema, &[("in.csv", "yes,12.5\nN,\n")], options, CreateMode::Create)
            .await
            .unwrap();
        assert_eq!(
            rows(&output(&dir), "t"),
            vec![
                vec![Value::Integer(1), Value::Real(12.5)],
                vec![Value::Integer(0), Value::Null],
            ]
        );
    }
}

#[tokio::test]
async fn test_rows_before_a_coercion_error_are_kept() {
    let dir = TempDir::new().unwrap();
    let result = run(
        &dir,
        INT_TEXT_SCHEMA,
        &[("in.csv", "1,x\nabc,y\n3,z\n")],
        row_wise(),
        CreateMode::Create,
    )
    .await;

    assert!(matches!(result, Err(LoaderError::Coercion { row: 2, .. })));
    assert_eq!(rows(&output(&dir), "t"), int_text(&[(1, "x")]));
}

#[tokio::test]
async fn test_round_trip_of_typed_columns() {
    let dir = TempDir::new().unwrap();
    let schema = r#"{"name": "typed", "columns": [
        {"name": "flag", "type": "BOOLEAN"},
        {"name": "n", "type": "BIG_INT"},
        {"name": "x", "type": "DOUBLE"},
        {"name": "d", "type": "DATE"},
        {"name": "ts", "type": "DATETIME"},
        {"name": "code", "type": "CHAR", "length": 2},
        {"name": "note", "type": "UNICODE_STRING"}
    ]}"#;
    let csv = "flag|n|x|d|ts|code|note\n\
               true|9000000000|2.5|2024-02-29|2024-02-29 10:11:12|AB|first\n\
               no||-0.5|1999-12-31|2000-01-01 00:00:00|CD|\n";
    let options = LoadOptions {
        delimiter: "|".into(),
        has_header: true,
        formats: TemporalFormats {
            date: Some("%Y-%m-%d".into()),
            timestamp: Some("%Y-%m-%d %H:%M:%S".into()),
            ..Default::default()
        },
        ..row_wise()
    };

    let summary = run(&dir, schema, &[("typed.csv", csv)], options, CreateMode::Create)
        .await
        .unwrap();
    assert_eq!(summary.warning_count(), 0);

    assert_eq!(
        rows(&output(&dir), "typed"),
        vec![
            vec![
                Value::Integer(1),
                Value::Integer(9_000_000_000),
                Value::Real(2.5),
                Value::Text("2024-02-29".into()),
                Value::Text("2024-02-29 10:11:12".into()),
                Value::Text("AB".into()),
                Value::Text("first".into()),
            ],
            vec![
                Value::Integer(0),
                Value::Null,
                Value::Real(-0.5),
                Value::Text("1999-12-31".into()),
                Value::Text("2000-01-01 00:00:00".into()),
                Value::Text("CD".into()),
                Value::Text("".into()),
            ],
        ]
    );
}

#[tokio::test]
async fn test_second_run_appends_to_existing_table() {
    let dir = TempDir::new().unwrap();
    let csv = [("in.csv", "1,x\n2,y\n")];

    let first = run(&dir, INT_TEXT_SCHEMA, &csv, row_wise(), CreateMode::Create).await.unwrap();
    assert!(first.created);

    // a drifted schema does not redefine the stored table
    let drifted = r#"{"name":"t","columns":[{"name":"a"},{"name":"b"}]}"#;
    let second = run(&dir, drifted, &csv, row_wise(), CreateMode::Create).await.unwrap();
    assert!(!second.created);

    assert_eq!(
        rows(&output(&dir), "t"),
        int_text(&[(1, "x"), (2, "y"), (1, "x"), (2, "y")])
    );
}

#[tokio::test]
async fn test_overwrite_replaces_the_extract() {
    let dir = TempDir::new().unwrap();
    let csv = [("in.csv", "1,x\n")];

    run(&dir, INT_TEXT_SCHEMA, &csv, row_wise(), CreateMode::Create).await.unwrap();
    let summary = run(&dir, INT_TEXT_SCHEMA, &csv, row_wise(), CreateMode::CreateAndReplace)
        .await
        .unwrap();

    assert!(summary.created);
    assert_eq!(rows(&output(&dir), "t"), int_text(&[(1, "x")]));
}

#[tokio::test]
async fn test_skip_boundaries() {
    let csv = "1,x\n2,y\n3,z\n";

    let dir = TempDir::new().unwrap();
    let options = LoadOptions { skip: 0, ..row_wise() };
    run(&dir, INT_TEXT_SCHEMA, &[("in.csv", csv)], options, CreateMode::Create)
        .await
        .unwrap();
    assert_eq!(rows(&output(&dir), "t"), int_text(&[(1, "x"), (2, "y"), (3, "z")]));

    let dir = TempDir::new().unwrap();
    let options = LoadOptions { skip: 2, ..row_wise() };
    run(&dir, INT_TEXT_SCHEMA, &[("in.csv", csv)], options, CreateMode::Create)
        .await
        .unwrap();
    assert_eq!(rows(&output(&dir), "t"), int_text(&[(3, "z")]));

    let dir = TempDir::new().unwrap();
    let options = LoadOptions { skip: 3, ..row_wise() };
    let summary = run(&dir, INT_TEXT_SCHEMA, &[("in.csv", csv)], options, CreateMode::Create)
        .await
        .unwrap();
    assert_eq!(summary.rows_ingested(), 0);
    assert_eq!(summary.reports[0].rows_skipped, 3);
    assert!(rows(&output(&dir), "t").is_empty());
}

#[tokio::test]
async fn test_files_are_ingested_in_declaration_order() {
    let dir = TempDir::new().unwrap();
    let options = LoadOptions {
        has_header: true,
        ..Default::default()
    };
    let summary = run(
        &dir,
        INT_TEXT_SCHEMA,
        &[("b.csv", "a,b\n2,y\n"), ("a.csv", "a,b\n1,x\n")],
        options,
        CreateMode::Create,
    )
    .await
    .unwrap();

    let sources: Vec<_> = summary.reports.iter().map(|r| r.source.clone()).collect();
    assert!(sources[0].ends_with("b.csv"));
    assert!(sources[1].ends_with("a.csv"));
    assert_eq!(rows(&output(&dir), "t"), int_text(&[(2, "y"), (1, "x")]));
}

#[tokio::test]
async fn test_staging_flow_loads_typed_rows() {
    let dir = TempDir::new().unwrap();
    let options = LoadOptions {
        delimiter: "\\t".into(),
        staging: true,
        ..Default::default()
    };
    let summary = run(&dir, INT_TEXT_SCHEMA, &[("in.tsv", "1\tx\n2\ty\n")], options, CreateMode::Create)
        .await
        .unwrap();

    assert_eq!(summary.rows_ingested(), 2);
    let store = SqliteStore::open(output(&dir), CreateMode::Create).unwrap();
    assert!(!store.table_exists("t__staging").unwrap());
    assert_eq!(store.read_rows("t").unwrap(), int_text(&[(1, "x"), (2, "y")]));
}

#[tokio::test]
async fn test_bulk_load_failure_is_atomic() {
    let dir = TempDir::new().unwrap();
    let err = run(
        &dir,
        INT_TEXT_SCHEMA,
        &[("in.csv", "1,x\n2,y,extra\n")],
        LoadOptions::default(),
        CreateMode::Create,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, LoaderError::Store(_)));
    assert!(rows(&output(&dir), "t").is_empty());
}

#[tokio::test]
async fn test_invalid_schema_leaves_no_artifact() {
    let dir = TempDir::new().unwrap();
    let err = run(
        &dir,
        r#"{"columns":[{"name":"a"}]}"#,
        &[("in.csv", "1\n")],
        LoadOptions::default(),
        CreateMode::Create,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, LoaderError::MissingField { field: "name", .. }));

    let err = run(
        &dir,
        r#"{"name":"t","columns":[{"name":"a","type":"VARCHAR"}]}"#,
        &[("in.csv", "1\n")],
        LoadOptions::default(),
        CreateMode::Create,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, LoaderError::MissingParameter { .. }));

    assert!(!output(&dir).exists());
}

#[tokio::test]
async fn test_missing_source_fails_before_the_store_opens() {
    let dir = TempDir::new().unwrap();
    let doc = SchemaDocument::from_json_str(INT_TEXT_SCHEMA).unwrap();
    let pipeline = ExtractPipeline::new(LoadOptions::default()).unwrap();
    let fetcher = LocalFetcher::new(dir.path());
    let path = output(&dir);

    let err = pipeline
        .run(&doc, &["nope.csv".to_string()], &SourceLocation::default(), &fetcher, || {
            SqliteStore::open(&path, CreateMode::Create)
        })
        .await
        .unwrap_err();

    assert!(matches!(err, LoaderError::Fetch(ref e) if e.is_not_found()));
    assert!(!path.exists());
}
