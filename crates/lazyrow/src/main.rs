//! lazyrow: browse a JSON record file through a cached, paged view
//!
//! Subcommands:
//! - `count`: number of records matching the filters
//! - `page`: a window of records rendered as a table
//! - `get`: one record by identity, as JSON
//! - `columns`: the properties found in the file

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use lazyrow_memory::MemoryBackend;
use lazyrow_view::{
    CachedView, GuardedPort, RecordAccessor, RetryConfig, RowLookup, ViewConfig, ViewError,
    VirtualCollection,
};
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rows::{
    JsonAccessor, JsonRow, RowId, format_value, parse_filter, parse_rows, parse_sort, render_table,
};

mod rows;

type Collection = VirtualCollection<CachedView<GuardedPort<MemoryBackend<JsonRow>>>>;

#[derive(Parser)]
#[command(name = "lazyrow")]
#[command(about = "Page, filter and sort JSON record files", long_about = None)]
struct Cli {
    /// JSON file holding an array of objects
    #[arg(long, env = "LAZYROW_FILE")]
    file: PathBuf,

    /// Field holding each record's identity (string or integer)
    #[arg(long, env = "LAZYROW_ID_FIELD", default_value = "id")]
    id_field: String,

    #[command(flatten)]
    view: ViewArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ViewArgs {
    /// Rows loaded around a single index lookup
    #[arg(long, env = "LAZYROW_PAGE_SIZE", default_value = "20")]
    page_size: usize,

    /// Identity cache bound
    #[arg(long, env = "LAZYROW_CACHE_MAX_SIZE", default_value = "200")]
    cache_max_size: usize,

    /// Per-call backend deadline in milliseconds
    #[arg(long, env = "LAZYROW_TIMEOUT_MS")]
    timeout_ms: Option<u64>,

    /// Extra attempts after a failed backend call
    #[arg(long, env = "LAZYROW_RETRIES", default_value = "0")]
    retries: u32,
}

impl ViewArgs {
    fn config(&self) -> ViewConfig {
        ViewConfig {
            page_size: self.page_size,
            cache_max_size: self.cache_max_size,
            fetch_timeout_ms: self.timeout_ms,
            retry: RetryConfig {
                max_retries: self.retries,
                ..Default::default()
            },
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Count records matching the filters
    Count {
        /// Filter such as `age>30`, `name~al%` or `city=null` (repeatable)
        #[arg(short, long = "filter")]
        filters: Vec<String>,
    },

    /// Print a window of records as a table
    Page {
        /// Index of the first row
        #[arg(long, default_value = "0")]
        offset: usize,

        /// Number of rows
        #[arg(long, default_value = "20")]
        count: usize,

        /// Filter such as `age>30`, `name~al%` or `city=null` (repeatable)
        #[arg(short, long = "filter")]
        filters: Vec<String>,

        /// Sort key `<property>[:asc|:desc]`; only the first is applied
        #[arg(short, long = "sort")]
        sort: Vec<String>,

        /// Columns to show (repeatable); defaults to every column
        #[arg(short, long = "column")]
        columns: Vec<String>,
    },

    /// Print one record by identity
    Get {
        /// Identity of the record
        id: String,
    },

    /// List the properties found in the file
    Columns,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing; stdout carries command output
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "lazyrow=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let collection = open(&cli)?;

    match cli.command {
        Commands::Count { filters } => {
            apply_filters(&collection, &filters).await?;
            let size = collection.size().await.map_err(|e| miette::miette!("{}", e))?;
            println!("{size}");
            Ok(())
        }

        Commands::Page {
            offset,
            count,
            filters,
            sort,
            columns,
        } => {
            apply_filters(&collection, &filters).await?;
            apply_sort(&collection, &sort).await?;
            print_page(&collection, offset, count, columns).await
        }

        Commands::Get { id } => print_record(&collection, &id).await,

        Commands::Columns => {
            print_columns(&collection);
            Ok(())
        }
    }
}

/// Load the record file and wrap it in a guarded, cached view.
fn open(cli: &Cli) -> Result<Collection> {
    let text = std::fs::read_to_string(&cli.file)
        .map_err(|e| miette::miette!("failed to read {}: {}", cli.file.display(), e))?;
    let records = parse_rows(&text, &cli.id_field)
        .map_err(|e| miette::miette!("failed to load {}: {}", cli.file.display(), e))?;

    let accessor = Arc::new(JsonAccessor::from_rows(&records, &cli.id_field));
    tracing::info!(
        file = %cli.file.display(),
        records = records.len(),
        columns = accessor.all().len(),
        "loaded records"
    );

    let backend = MemoryBackend::new(accessor.clone(), records);
    let view = CachedView::guarded(backend, accessor, &cli.view.config())
        .map_err(|e| miette::miette!("{}", e))?;
    Ok(VirtualCollection::new(view))
}

async fn apply_filters(collection: &Collection, filters: &[String]) -> Result<()> {
    for arg in filters {
        let filter = parse_filter(arg).map_err(|e| miette::miette!("{}", e))?;
        collection
            .add_filter(filter)
            .await
            .map_err(|e| miette::miette!("filter '{}' rejected: {}", arg, e))?;
    }
    Ok(())
}

async fn apply_sort(collection: &Collection, sort: &[String]) -> Result<()> {
    if sort.is_empty() {
        return Ok(());
    }
    let (properties, ascending): (Vec<String>, Vec<bool>) = sort
        .iter()
        .map(|arg| parse_sort(arg))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| miette::miette!("{}", e))?
        .into_iter()
        .unzip();
    collection
        .sort(&properties, &ascending)
        .await
        .map_err(|e| miette::miette!("{}", e))
}

async fn print_page(
    collection: &Collection,
    offset: usize,
    count: usize,
    columns: Vec<String>,
) -> Result<()> {
    let properties = if columns.is_empty() {
        collection.visible_property_ids()
    } else {
        let known = collection.property_ids();
        if let Some(unknown) = columns.iter().find(|c| !known.contains(*c)) {
            return Err(miette::miette!(
                "unknown column '{}' (known: {})",
                unknown,
                known.join(", ")
            ));
        }
        columns
    };
    let headers: Vec<String> = properties
        .iter()
        .map(|p| collection.column_name(p))
        .collect();

    let mut body: Vec<Vec<String>> = Vec::new();
    let mut degraded = 0;
    for index in offset..offset.saturating_add(count) {
        let lookup = collection
            .object_by_index(index)
            .await
            .map_err(|e| miette::miette!("{}", e))?;
        let record = match lookup {
            RowLookup::Found(record) => record,
            RowLookup::Degraded { sentinel, reason } => {
                tracing::warn!(index, %reason, "row unavailable");
                degraded += 1;
                sentinel
            }
            RowLookup::Missing => break,
        };
        body.push(
            properties
                .iter()
                .map(|p| format_value(record.lookup(p)))
                .collect(),
        );
    }

    print!("{}", render_table(&headers, &body));
    if degraded > 0 {
        tracing::warn!(degraded, "some rows could not be loaded");
    }
    Ok(())
}

async fn print_record(collection: &Collection, arg: &str) -> Result<()> {
    for id in RowId::candidates(arg) {
        match collection.object(&id).await {
            Ok(record) => {
                let text = serde_json::to_string_pretty(&record.to_json())
                    .map_err(|e| miette::miette!("{}", e))?;
                println!("{text}");
                return Ok(());
            }
            Err(ViewError::NotFound(_)) => continue,
            Err(e) => return Err(miette::miette!("{}", e)),
        }
    }
    Err(miette::miette!("no record with identity '{}'", arg))
}

fn print_columns(collection: &Collection) {
    let sortable = collection.sortable_property_ids();
    let filterable = collection.filterable_property_ids();
    let flag = |set: &[String], property: &String| {
        let mark = if set.contains(property) { "yes" } else { "no" };
        mark.to_string()
    };

    let headers = ["Property", "Column", "Sortable", "Filterable"].map(String::from);
    let body: Vec<Vec<String>> = collection
        .property_ids()
        .iter()
        .map(|property| {
            vec![
                property.clone(),
                collection.column_name(property),
                flag(&sortable, property),
                flag(&filterable, property),
            ]
        })
        .collect();
    print!("{}", render_table(&headers, &body));
}
