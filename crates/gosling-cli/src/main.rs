mod output;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use gosling_config::{AppConfig, ConfigLoader, LogConfig};
use gosling_migrate::{Engine, FunctionRegistry, Migrator, SqliteDatabase, dialect_from_name};
use tracing::debug;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
#[command(name = "gosling", version)]
#[command(about = "Apply and roll back versioned SQL migrations")]
struct Cli {
    /// Config file (YAML or TOML). Defaults to gosling.yml in the current directory
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the migration scripts
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// SQLite database file
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Name of the version table
    #[arg(long, global = true)]
    table: Option<String>,

    /// Abort a single migration after this many seconds
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Apply all pending migrations
    Up,
    /// Apply pending migrations up to and including VERSION
    UpTo { version: i64 },
    /// Apply the next pending migration
    UpByOne,
    /// Roll back the current version
    Down,
    /// Roll back until the current version is VERSION
    DownTo { version: i64 },
    /// Roll back the current version and apply it again
    Redo,
    /// Roll back every applied migration
    Reset,
    /// Show the applied state of each migration
    Status {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Print the current version
    Version,
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("gosling: {e:#}");
            let indeterminate = e
                .downcast_ref::<gosling_common::Error>()
                .is_some_and(|e| e.is_indeterminate());
            if indeterminate {
                eprintln!("gosling: verify the database state by hand before running again");
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let cwd = std::env::current_dir().context("failed to read current directory")?;
    let mut config = ConfigLoader::resolve(cli.config.as_deref(), &cwd)
        .context("failed to load configuration")?;
    apply_flags(&mut config, &cli);
    init_logging(&config.log)?;
    debug!("effective config: {config:?}");

    if config.database.driver != "sqlite" {
        bail!(
            "unsupported driver '{}': the gosling binary only opens sqlite databases",
            config.database.driver
        );
    }

    let migrator = build_migrator(&config)?;
    let mut db = SqliteDatabase::open(&config.database.path).with_context(|| {
        format!(
            "failed to open database {}",
            config.database.path.display()
        )
    })?;

    match cli.command {
        Command::Up => output::print_report(&migrator.up(&mut db)?),
        Command::UpTo { version } => output::print_report(&migrator.up_to(&mut db, version)?),
        Command::UpByOne => output::print_report(&migrator.up_by_one(&mut db)?),
        Command::Down => output::print_report(&migrator.down(&mut db)?),
        Command::DownTo { version } => {
            output::print_report(&migrator.down_to(&mut db, version)?)
        }
        Command::Redo => output::print_report(&migrator.redo(&mut db)?),
        Command::Reset => output::print_report(&migrator.reset(&mut db)?),
        Command::Status { json } => {
            if json {
                println!("{}", migrator.status_json(&mut db)?);
            } else {
                print!("{}", output::status_table(&migrator.status(&mut db)?));
            }
        }
        Command::Version => println!("gosling: version {}", migrator.version(&mut db)?),
    }
    Ok(())
}

/// Command-line flags take precedence over the config file and environment.
fn apply_flags(config: &mut AppConfig, cli: &Cli) {
    if let Some(dir) = &cli.dir {
        config.migrations.dir = dir.clone();
    }
    if let Some(database) = &cli.database {
        config.database.path = database.clone();
    }
    if let Some(table) = &cli.table {
        config.migrations.table = table.clone();
    }
    if let Some(secs) = cli.timeout_secs {
        config.migrations.timeout_secs = Some(secs);
    }
}

fn build_migrator(config: &AppConfig) -> Result<Migrator> {
    let dialect = dialect_from_name(config.database.dialect_name())?;

    // Function migrations need a custom binary that fills this registry.
    let mut engine = Engine::new(
        Arc::from(dialect),
        FunctionRegistry::new(),
        config.migrations.table.clone(),
    );
    if let Some(secs) = config.migrations.timeout_secs {
        engine = engine.with_timeout(Duration::from_secs(secs));
    }
    Ok(Migrator::new(engine, config.migrations.dir.clone()))
}

fn init_logging(log: &LogConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&log.level))
        .with_context(|| format!("invalid log level '{}'", log.level))?;

    let registry = tracing_subscriber::registry().with(filter);
    if log.json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
    }
    .context("failed to install log subscriber")
}
