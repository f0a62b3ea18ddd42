use anyhow::{Context, Result};
use clap::Parser;
use extract_loader::{
    CreateMode, ExtractPipeline, Fetcher, LoadOptions, LocalFetcher, S3Fetcher, S3Settings, SchemaDocument,
    SourceLocation, SqliteStore, Strategy, TemporalFormats,
};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "extract-loader")]
#[command(about = "Load CSV files into a single-file extract described by a JSON schema")]
struct Args {
    /// JSON schema document (table name, columns, files)
    #[arg(short, long)]
    schema: PathBuf,

    /// Object storage access key (or AWS_ACCESS_KEY_ID)
    #[arg(short = 'a', long)]
    accesskey: Option<String>,

    /// Object storage secret key (or AWS_SECRET_ACCESS_KEY)
    #[arg(short = 'k', long)]
    secretkey: Option<String>,

    #[arg(short, long)]
    bucket: Option<String>,

    /// Folder holding the CSV files, in the bucket or below the working directory
    #[arg(short, long)]
    path: Option<String>,

    #[arg(short, long, default_value = "output.hyper")]
    output: PathBuf,

    /// Field delimiter; `\t` selects tab
    #[arg(short, long, default_value = ",")]
    delimiter: String,

    /// CSV files start with a header record
    #[arg(short, long)]
    ignoreheader: bool,

    /// Replace the output file if it exists
    #[arg(short = 'w', long)]
    overwrite: bool,

    /// Read CSV files from disk instead of object storage
    #[arg(short, long)]
    localread: bool,

    /// Land each file in a text staging table before the typed copy
    #[arg(short, long)]
    temptable: bool,

    /// Data records to discard at the start of each file (row-wise only)
    #[arg(long, default_value_t = 0)]
    skip: u64,

    /// Coerce and insert record by record instead of bulk loading
    #[arg(long)]
    row_wise: bool,

    /// chrono format of DATE cells, e.g. %Y-%m-%d
    #[arg(long)]
    date_format: Option<String>,

    #[arg(long)]
    time_format: Option<String>,

    #[arg(long)]
    timestamp_format: Option<String>,

    #[arg(long)]
    timestamp_tz_format: Option<String>,

    /// Object storage region (or AWS_REGION)
    #[arg(long)]
    region: Option<String>,

    /// S3-compatible endpoint URL (or EXTRACT_S3_ENDPOINT)
    #[arg(long)]
    endpoint: Option<String>,

    /// Where downloaded files are kept (or EXTRACT_DOWNLOAD_DIR)
    #[arg(long)]
    download_dir: Option<PathBuf>,
}

impl Args {
    fn load_options(&self) -> LoadOptions {
        LoadOptions {
            delimiter: self.delimiter.clone(),
            has_header: self.ignoreheader,
            skip: self.skip,
            strategy: if self.row_wise { Strategy::RowWise } else { Strategy::Bulk },
            staging: self.temptable,
            formats: TemporalFormats {
                date: self.date_format.clone(),
                time: self.time_format.clone(),
                timestamp: self.timestamp_format.clone(),
                timestamp_tz: self.timestamp_tz_format.clone(),
            },
        }
    }

    fn fetcher(&self) -> Box<dyn Fetcher> {
        if self.localread {
            return Box::new(LocalFetcher::new("."));
        }
        let settings = S3Settings::from_env().with_overrides(
            self.accesskey.clone(),
            self.secretkey.clone(),
            self.region.clone(),
            self.endpoint.clone(),
            self.download_dir.clone(),
        );
        Box::new(S3Fetcher::new(settings))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    info!("extract-loader starting, output {}", args.output.display());

    let doc = SchemaDocument::from_path(&args.schema)
        .with_context(|| format!("Failed to read schema {}", args.schema.display()))?;
    let files = match doc.source_files() {
        Ok(files) => files.to_vec(),
        Err(_) => {
            warn!("Schema lists no files, only the table will be created");
            Vec::new()
        }
    };

    let pipeline = ExtractPipeline::new(args.load_options()).context("Invalid load options")?;
    let location = SourceLocation {
        bucket: args.bucket.clone(),
        folder: args.path.clone(),
    };
    let mode = if args.overwrite {
        CreateMode::CreateAndReplace
    } else {
        CreateMode::Create
    };
    let fetcher = args.fetcher();

    let summary = pipeline
        .run(&doc, &files, &location, fetcher.as_ref(), || SqliteStore::open(&args.output, mode))
        .await
        .context("Extract failed")?;

    for report in &summary.reports {
        info!(
            "{}: {} rows, {} skipped, {} warnings",
            report.source,
            report.rows_ingested,
            report.rows_skipped,
            report.warning_count()
        );
    }
    info!(
        "Done: {} rows into table {} of {}",
        summary.rows_ingested(),
        summary.table,
        args.output.display()
    );
    Ok(())
}
