use crate::error::{ErrorKind, Result};
use clap::{ArgAction, Parser, Subcommand, ValueHint};
use exn::ResultExt;
use regmirror_catalog::{ActivityLog, Database, Repository};
use regmirror_config::Config;
use regmirror_registry::HttpRegistry;
use regmirror_storage::backend::LocalBackend;
use regmirror_sync::{Context, PipelineConfig, SyncSummary, Triggered, trigger};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Parser)]
#[command(author, version, about, arg_required_else_help = true)]
pub struct Args {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long, global = true, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short = 'v', long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sync a package, and everything it depends on, from upstream
    #[command(arg_required_else_help = true)]
    Sync {
        /// Package name, e.g. `left-pad` or `@scope/pkg`
        name: String,

        /// Identity recorded against the sync log
        #[arg(short, long)]
        user: Option<String>,

        /// Print sync log lines as they are written
        #[arg(short, long)]
        follow: bool,
    },

    /// Print a stored sync log
    #[command(arg_required_else_help = true)]
    Log {
        /// Log id, as printed by `sync`
        id: i64,
    },
}

/// Install the global subscriber. `-v` takes precedence over `RUST_LOG`.
pub fn setup_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

pub async fn run(args: Args) -> Result<ExitCode> {
    let config = Config::load(args.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    let database = Database::connect(&config.database.path).await.or_raise(|| ErrorKind::Catalog)?;
    let repository = Arc::new(Repository::from(&database));

    let result = match args.command {
        Command::Sync { name, user, follow } => {
            let username = user.unwrap_or_else(|| config.sync.username.clone());
            match context(&config, repository) {
                Ok(ctx) => sync(&ctx, &name, &username, follow).await,
                Err(error) => Err(error),
            }
        },
        Command::Log { id } => print_log(repository.as_ref(), id).await,
    };
    database.close().await;
    result
}

fn context(config: &Config, repository: Arc<Repository>) -> Result<Context> {
    let http = reqwest::Client::builder()
        .user_agent(&config.registry.user_agent)
        .build()
        .or_raise(|| ErrorKind::Http)?;
    let registry = HttpRegistry::with_client(config.registry.url.as_str(), http.clone());
    let mut storage = LocalBackend::new(config.storage.name.as_str(), &config.storage.root).or_raise(|| ErrorKind::Storage)?;
    if let Some(base_url) = &config.storage.base_url {
        storage = storage.with_base_url(base_url.as_str());
    }
    tracing::debug!(registry = %config.registry.url, storage = %config.storage.root.display(), "Collaborators ready");
    Ok(Context {
        registry: Arc::new(registry),
        catalog: repository.clone(),
        activity: repository,
        storage: Arc::new(storage),
        http,
        config: PipelineConfig::new(&config.sync.download_dir).with_download_timeout(config.sync.download_timeout()),
    })
}

async fn sync(ctx: &Context, name: &str, username: &str, follow: bool) -> Result<ExitCode> {
    let (log_id, mut handle) = match trigger(ctx, name, username).await.or_raise(|| ErrorKind::Sync)? {
        Triggered::Missing { status } => {
            eprintln!("package {name} does not exist upstream (HTTP {status})");
            return Ok(ExitCode::FAILURE);
        },
        Triggered::Started { log_id, package, handle } => {
            tracing::info!(name = %package.name, versions = package.versions.len(), "Found package upstream");
            (log_id, handle)
        },
    };
    println!("log id: {log_id}");

    let activity = ctx.activity.as_ref();
    let mut printed = 0;
    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    let summary = loop {
        tokio::select! {
            joined = &mut handle => break joined.or_raise(|| ErrorKind::Join)?,
            _ = ticker.tick(), if follow => printed = print_new_lines(activity, log_id, printed).await?,
        }
    };
    print_new_lines(activity, log_id, printed).await?;
    print_summary(&summary);
    Ok(ExitCode::SUCCESS)
}

/// Print log lines after the first `skip`, returning the new total.
async fn print_new_lines(activity: &dyn ActivityLog, id: i64, skip: usize) -> Result<usize> {
    let Some(record) = activity.read(id).await.or_raise(|| ErrorKind::Catalog)? else {
        exn::bail!(ErrorKind::LogNotFound(id));
    };
    let mut total = 0;
    for line in record.lines() {
        if total >= skip {
            println!("{line}");
        }
        total += 1;
    }
    Ok(total)
}

fn print_summary(summary: &SyncSummary) {
    println!();
    println!(
        "{}: {} package(s) synced, {} failed",
        summary.name,
        summary.successes.len(),
        summary.fails.len()
    );
    for report in &summary.reports {
        let latest = report.latest().map(|v| v.version.as_str()).unwrap_or("-");
        println!(
            "  {}: {} new, {} failed, {} skipped, latest {latest}, tags {}/{}, descriptions {}/{}",
            report.name,
            report.synced.len(),
            report.failed.len(),
            report.skipped.len(),
            report.tags.completed,
            report.tags.completed + report.tags.failed,
            report.descriptions.completed,
            report.descriptions.completed + report.descriptions.failed,
        );
    }
    if !summary.fails.is_empty() {
        println!("  failed: {}", summary.fails.join(", "));
    }
}

async fn print_log(activity: &dyn ActivityLog, id: i64) -> Result<ExitCode> {
    let Some(record) = activity.read(id).await.or_raise(|| ErrorKind::Catalog)? else {
        exn::bail!(ErrorKind::LogNotFound(id));
    };
    println!("# {} by {} (created {})", record.name, record.username, record.created_at);
    for line in record.lines() {
        println!("{line}");
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_sync() {
        let args = Args::try_parse_from(["regmirror", "-vv", "sync", "@scope/pkg", "--user", "bob", "--follow"]).unwrap();
        assert_eq!(args.verbose, 2);
        match args.command {
            Command::Sync { name, user, follow } => {
                assert_eq!(name, "@scope/pkg");
                assert_eq!(user.as_deref(), Some("bob"));
                assert!(follow);
            },
            Command::Log { .. } => panic!("parsed as log"),
        }
    }

    #[test]
    fn test_parse_log_with_config() {
        let args = Args::try_parse_from(["regmirror", "log", "42", "--config", "/etc/regmirror.toml"]).unwrap();
        assert_eq!(args.config, Some(PathBuf::from("/etc/regmirror.toml")));
        assert!(matches!(args.command, Command::Log { id: 42 }));
    }

    #[tokio::test]
    async fn test_print_log_missing() {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = Repository::from(&db);
        let err = print_log(&repo, 7).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::LogNotFound(7)));
    }
}
