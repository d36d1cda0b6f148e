//! Errata CLI - error code catalog service

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use errata_core::catalog::{
    DeclaredErrorCode, ErrorCode, ErrorCodeDraft, ErrorCodeFilter, ErrorCodeKind,
    ErrorCodeRepository, ErrorCodeService, PageRequest,
};
use errata_core::config::Config;
use errata_core::storage::{Database, DatabaseConfig};

#[derive(Parser)]
#[command(name = "errata")]
#[command(author, version, about = "Error code catalog service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the catalog database (overrides config)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Clone, Copy, Default, PartialEq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum KindArg {
    Manual,
    Auto,
}

impl From<KindArg> for ErrorCodeKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Manual => ErrorCodeKind::Manual,
            KindArg::Auto => ErrorCodeKind::AutoGenerated,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new error code
    Create {
        /// Numeric code, unique across the catalog
        #[arg(long)]
        code: i64,
        /// Owning application name
        #[arg(long = "app")]
        application: String,
        /// Message template
        #[arg(long)]
        message: String,
    },

    /// Overwrite an existing error code entry
    Update {
        /// Entry id
        id: i64,
        #[arg(long)]
        code: i64,
        #[arg(long = "app")]
        application: String,
        #[arg(long)]
        message: String,
    },

    /// Delete an error code entry
    Delete {
        /// Entry id
        id: i64,
    },

    /// Show one error code entry
    Get {
        /// Entry id
        id: i64,
    },

    /// List error codes
    List {
        /// Exact code match
        #[arg(long)]
        code: Option<i64>,
        /// Application name substring match
        #[arg(long = "app")]
        application: Option<String>,
        /// Provenance filter
        #[arg(long)]
        kind: Option<KindArg>,
    },

    /// Page through error codes
    Page {
        /// Page number (1-based)
        #[arg(long, default_value_t = 1)]
        page: u32,
        /// Page size (defaults to the configured page size)
        #[arg(long)]
        page_size: Option<u32>,
        #[arg(long)]
        code: Option<i64>,
        #[arg(long = "app")]
        application: Option<String>,
        #[arg(long)]
        kind: Option<KindArg>,
    },

    /// Reconcile a JSON batch of declared error codes into the catalog
    Import {
        /// JSON file holding an array of declared error codes
        file: PathBuf,
    },

    /// Show error codes for one application changed after a timestamp
    ChangedSince {
        #[arg(long = "app")]
        application: String,
        /// RFC 3339 timestamp, e.g. 2026-08-04T00:00:00Z
        #[arg(long)]
        since: String,
    },

    /// Run health check
    Doctor,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show a configuration value
    Get { key: String },
    /// Set a configuration value
    Set { key: String, value: String },
    /// List all configuration values
    List,
    /// Print the config file path
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing; logs go to stderr so JSON output stays pipeable
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("errata_core=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    let database_path = cli
        .database
        .clone()
        .unwrap_or_else(|| config.resolved_database_path());
    tracing::debug!(path = %database_path.display(), "Using catalog database");

    match cli.command {
        Commands::Create {
            code,
            application,
            message,
        } => {
            let db = open_database(&database_path).await?;
            let draft = ErrorCodeDraft {
                code,
                application_name: application,
                message,
            };
            cmd_create(&service_for(&db), &draft, cli.format, cli.quiet).await
        }

        Commands::Update {
            id,
            code,
            application,
            message,
        } => {
            let db = open_database(&database_path).await?;
            let draft = ErrorCodeDraft {
                code,
                application_name: application,
                message,
            };
            cmd_update(&service_for(&db), id, &draft, cli.quiet).await
        }

        Commands::Delete { id } => {
            let db = open_database(&database_path).await?;
            cmd_delete(&service_for(&db), id, cli.quiet).await
        }

        Commands::Get { id } => {
            let db = open_database(&database_path).await?;
            cmd_get(&service_for(&db), id, cli.format).await
        }

        Commands::List {
            code,
            application,
            kind,
        } => {
            let db = open_database(&database_path).await?;
            let filter = ErrorCodeFilter {
                code,
                application_name: application,
                kind: kind.map(Into::into),
            };
            cmd_list(&service_for(&db), &filter, cli.format, cli.quiet).await
        }

        Commands::Page {
            page,
            page_size,
            code,
            application,
            kind,
        } => {
            let db = open_database(&database_path).await?;
            let filter = ErrorCodeFilter {
                code,
                application_name: application,
                kind: kind.map(Into::into),
            };
            let page_req = PageRequest {
                page,
                page_size: page_size
                    .unwrap_or(config.catalog.default_page_size)
                    .min(config.catalog.max_page_size),
            };
            cmd_page(&service_for(&db), &filter, &page_req, cli.format, cli.quiet).await
        }

        Commands::Import { file } => {
            let db = open_database(&database_path).await?;
            cmd_import(&service_for(&db), &file, cli.quiet).await
        }

        Commands::ChangedSince { application, since } => {
            let db = open_database(&database_path).await?;
            cmd_changed_since(&service_for(&db), &application, &since, cli.format).await
        }

        Commands::Doctor => cmd_doctor(&database_path, cli.quiet).await,

        Commands::Config { action } => cmd_config(action, cli.quiet),
    }
}

async fn open_database(path: &Path) -> anyhow::Result<Database> {
    Database::new(DatabaseConfig::with_path(path.to_path_buf())).await
}

fn service_for(db: &Database) -> ErrorCodeService {
    ErrorCodeService::new(ErrorCodeRepository::new(db.pool().clone()))
}

// ============================================================================
// Command Implementations
// ============================================================================

fn print_record(record: &ErrorCode) {
    println!("Error code: {}", record.code);
    println!("  ID: {}", record.id);
    println!("  Application: {}", record.application_name);
    println!("  Message: {}", record.message);
    println!("  Kind: {}", record.kind.as_str());
    println!("  Created: {}", record.create_time.format("%Y-%m-%d %H:%M:%S"));
    println!("  Updated: {}", record.update_time.format("%Y-%m-%d %H:%M:%S"));
}

fn print_record_line(record: &ErrorCode) {
    println!(
        "  {} - {} [{}] {}",
        record.code,
        record.application_name,
        record.kind.as_str(),
        record.message
    );
}

async fn cmd_create(
    service: &ErrorCodeService,
    draft: &ErrorCodeDraft,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    let id = service.create(draft).await?;

    if format == OutputFormat::Json {
        println!("{}", serde_json::json!({ "id": id }));
    } else if !quiet {
        println!("Error code created.");
        println!("  ID: {}", id);
        println!("  Code: {}", draft.code);
        println!("  Application: {}", draft.application_name);
    }
    Ok(())
}

async fn cmd_update(
    service: &ErrorCodeService,
    id: i64,
    draft: &ErrorCodeDraft,
    quiet: bool,
) -> anyhow::Result<()> {
    service.update(id, draft).await?;
    if !quiet {
        println!("Error code entry {} updated.", id);
    }
    Ok(())
}

async fn cmd_delete(service: &ErrorCodeService, id: i64, quiet: bool) -> anyhow::Result<()> {
    service.delete(id).await?;
    if !quiet {
        println!("Error code entry {} deleted.", id);
    }
    Ok(())
}

async fn cmd_get(service: &ErrorCodeService, id: i64, format: OutputFormat) -> anyhow::Result<()> {
    match service.get(id).await? {
        Some(record) => {
            if format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&record)?);
            } else {
                print_record(&record);
            }
            Ok(())
        }
        None => Err(anyhow::anyhow!(
            "Error code entry {} not found. Run `errata list` to see the catalog.",
            id
        )),
    }
}

async fn cmd_list(
    service: &ErrorCodeService,
    filter: &ErrorCodeFilter,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    let records = service.list(filter).await?;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        if !quiet {
            println!("No error codes found.");
            println!("\nRegister one with: errata create --code <code> --app <name> --message <msg>");
        }
    } else {
        if !quiet {
            println!("Error codes:");
        }
        for record in &records {
            print_record_line(record);
        }
    }
    Ok(())
}

async fn cmd_page(
    service: &ErrorCodeService,
    filter: &ErrorCodeFilter,
    page_req: &PageRequest,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    let page = service.page(filter, page_req).await?;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&page)?);
        return Ok(());
    }

    for record in &page.items {
        print_record_line(record);
    }
    if !quiet {
        let pages = (page.total as u64).div_ceil(u64::from(page.page_size)).max(1);
        println!("\nPage {} of {} ({} total)", page.page, pages, page.total);
    }
    Ok(())
}

async fn cmd_import(
    service: &ErrorCodeService,
    file: &Path,
    quiet: bool,
) -> anyhow::Result<()> {
    let contents = std::fs::read_to_string(file)
        .map_err(|e| anyhow::anyhow!("Failed to read batch file {}: {}", file.display(), e))?;
    let batch: Vec<DeclaredErrorCode> = serde_json::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("Failed to parse batch file {}: {}", file.display(), e))?;

    service.reconcile(&batch).await?;

    if !quiet {
        println!("Reconciled {} declared error codes.", batch.len());
    }
    Ok(())
}

async fn cmd_changed_since(
    service: &ErrorCodeService,
    application: &str,
    since: &str,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let min_update_time: DateTime<Utc> = DateTime::parse_from_rfc3339(since)
        .map_err(|e| anyhow::anyhow!("Invalid RFC 3339 timestamp '{}': {}", since, e))?
        .with_timezone(&Utc);

    let snapshots = service.changed_since(application, min_update_time).await?;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&snapshots)?);
    } else {
        for snapshot in &snapshots {
            println!(
                "  {} - {} (updated {})",
                snapshot.code,
                snapshot.message,
                snapshot.update_time.format("%Y-%m-%d %H:%M:%S")
            );
        }
    }
    Ok(())
}

async fn cmd_doctor(database_path: &Path, quiet: bool) -> anyhow::Result<()> {
    let db = open_database(database_path).await?;

    db.health_check().await?;
    println!("Database: ok ({})", database_path.display());

    let status = db.migration_status().await?;
    println!(
        "Schema: v{} (target v{}){}",
        status.current_version,
        status.target_version,
        if status.needs_migration {
            " - migration needed"
        } else {
            ""
        }
    );

    let count = ErrorCodeRepository::new(db.pool().clone()).count().await?;
    println!("Error codes: {}", count);

    if !quiet && count == 0 {
        println!("\nRegister one with: errata create --code <code> --app <name> --message <msg>");
    }
    Ok(())
}

fn cmd_config(action: ConfigAction, quiet: bool) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            println!("{}", config.get(&key)?);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            if !quiet {
                println!("Set {} = {}", key, value);
            }
        }
        ConfigAction::List => {
            let config = Config::load()?;
            for key in Config::keys() {
                println!("{} = {}", key, config.get(key)?);
            }
        }
        ConfigAction::Path => {
            println!("{}", Config::config_path()?.display());
        }
    }
    Ok(())
}
