//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use notionsync_core::{ProgressReporter, SyncDriver, SyncReport, list_synced};
use notionsync_notion::{ClientOptions, NotionClient};
use notionsync_shared::{
    AppConfig, SyncConfig, init_config, load_config, load_config_from, resolve_token,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// notionsync: pull a Notion database into a static-site content tree.
#[derive(Parser)]
#[command(
    name = "notionsync",
    version,
    about = "Pull a Notion database into Markdown page bundles for a static site.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file to use instead of ~/.notionsync/notionsync.toml.
    #[arg(long, global = true, env = "NOTIONSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Pull every page of the database and regenerate its content directory.
    Sync(SyncArgs),

    /// List synchronized pages found under the content root.
    List {
        /// Content root (defaults to output.content_root).
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Flags overriding the config file for one sync run.
#[derive(Args, Debug, Default)]
pub(crate) struct SyncArgs {
    /// Database to pull (overrides notion.database_id).
    #[arg(long)]
    pub database: Option<String>,

    /// Content root to write into (overrides output.content_root).
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Pages synchronized at once (overrides sync.concurrency).
    #[arg(short, long)]
    pub concurrency: Option<usize>,

    /// Write the raw query responses to this file.
    #[arg(long)]
    pub dump: Option<PathBuf>,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "notionsync=info",
        1 => "notionsync=debug",
        _ => "notionsync=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Sync(args) => cmd_sync(config_path, &args).await,
        Command::List { out } => cmd_list(config_path, out.as_deref()).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

fn load(config_path: Option<&Path>) -> Result<AppConfig> {
    let config = match config_path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    Ok(config)
}

/// Merge command-line overrides into the runtime config.
fn apply_overrides(config: &mut SyncConfig, args: &SyncArgs) {
    if let Some(database) = &args.database {
        config.database_id = database.clone();
    }
    if let Some(out) = &args.out {
        config.content_root = out.clone();
    }
    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency.max(1);
    }
    if let Some(dump) = &args.dump {
        config.dump_path = Some(dump.clone());
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_sync(config_path: Option<&Path>, args: &SyncArgs) -> Result<()> {
    let app = load(config_path)?;
    let token = resolve_token(&app)?;

    let mut config = SyncConfig::from(&app);
    apply_overrides(&mut config, args);

    let client = NotionClient::new(token, ClientOptions::from_config(&app)?)?;
    let driver = SyncDriver::new(Arc::new(client), &config)?;

    info!(
        database_id = %config.database_id,
        content_root = %config.content_root.display(),
        concurrency = config.concurrency,
        "starting sync"
    );

    let reporter = CliProgress::new();
    let report = driver.run(&reporter).await?;

    print_summary(&report, &config.content_root);

    if report.is_success() {
        Ok(())
    } else {
        Err(eyre!(
            "{} of {} pages failed to sync",
            report.failed.len(),
            report.total
        ))
    }
}

fn print_summary(report: &SyncReport, content_root: &Path) {
    println!();
    println!("  Sync finished.");
    println!("  Pages:     {}", report.total);
    println!("  Succeeded: {}", report.succeeded.len());
    println!("  Failed:    {}", report.failed.len());
    println!("  Output:    {}", content_root.display());
    println!("  Time:      {:.1}s", report.elapsed.as_secs_f64());

    if !report.failed.is_empty() {
        println!();
        println!("  Failed pages:");
        for failure in &report.failed {
            println!(
                "    {} ({}): {}",
                failure.page_id,
                failure.slug.as_deref().unwrap_or("-"),
                failure.error
            );
        }
    }
    println!();
}

async fn cmd_list(config_path: Option<&Path>, out: Option<&Path>) -> Result<()> {
    let root = match out {
        Some(out) => out.to_path_buf(),
        None => SyncConfig::from(&load(config_path)?).content_root,
    };

    let pages = list_synced(&root).await?;
    if pages.is_empty() {
        println!("No synchronized pages under {}", root.display());
        return Ok(());
    }

    let width = pages.iter().map(|p| p.slug.len()).max().unwrap_or(0);
    for page in &pages {
        println!(
            "{:<width$}  {}  {}",
            page.slug, page.marker.page_id, page.marker.title
        );
    }
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = load(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn pages_found(&self, total: usize) {
        self.spinner.set_message(format!("Found {total} pages"));
    }

    fn page_finished(&self, label: &str, ok: bool, current: usize, total: usize) {
        let status = if ok { "synced" } else { "failed" };
        self.spinner
            .set_message(format!("[{current}/{total}] {status} {label}"));
    }

    fn done(&self, _report: &SyncReport) {
        self.spinner.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sync_flags() {
        let cli = Cli::try_parse_from([
            "notionsync",
            "-vv",
            "--log-format",
            "json",
            "sync",
            "--database",
            "db-1",
            "--out",
            "site/content/posts",
            "--concurrency",
            "4",
            "--dump",
            "ndata.json",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.log_format, LogFormat::Json));
        let Command::Sync(args) = cli.command else {
            panic!("expected sync command");
        };
        assert_eq!(args.database.as_deref(), Some("db-1"));
        assert_eq!(args.concurrency, Some(4));
    }

    #[test]
    fn global_config_flag_after_subcommand() {
        let cli = Cli::try_parse_from(["notionsync", "list", "--config", "/etc/ns.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/ns.toml")));
    }

    #[test]
    fn overrides_replace_config_values() {
        let mut config = SyncConfig::from(&AppConfig::default());
        let args = SyncArgs {
            database: Some("db-2".into()),
            out: Some(PathBuf::from("out")),
            concurrency: Some(0),
            dump: Some(PathBuf::from("dump.json")),
        };

        apply_overrides(&mut config, &args);

        assert_eq!(config.database_id, "db-2");
        assert_eq!(config.content_root, PathBuf::from("out"));
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.dump_path, Some(PathBuf::from("dump.json")));
    }

    #[test]
    fn no_overrides_keep_config() {
        let mut config = SyncConfig::from(&AppConfig::default());
        let before = config.clone();
        apply_overrides(&mut config, &SyncArgs::default());
        assert_eq!(config.database_id, before.database_id);
        assert_eq!(config.content_root, before.content_root);
        assert_eq!(config.concurrency, before.concurrency);
    }
}
