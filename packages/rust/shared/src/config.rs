//! Application configuration for notionsync.
//!
//! User config lives at `~/.notionsync/notionsync.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "notionsync.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".notionsync";

/// Largest page size the source API accepts.
pub const MAX_PAGE_SIZE: u32 = 100;

// ---------------------------------------------------------------------------
// Config structs (matching notionsync.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Source database connection.
    #[serde(default)]
    pub notion: NotionConfig,

    /// Names of the page properties read into front-matter.
    #[serde(default)]
    pub properties: PropertyNames,

    /// Content tree settings.
    #[serde(default)]
    pub output: OutputConfig,

    /// Concurrency and timeouts.
    #[serde(default)]
    pub sync: SyncTuning,

    /// Backoff policy for idempotent requests.
    #[serde(default)]
    pub retry: RetryConfig,
}

/// `[notion]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotionConfig {
    /// Name of the env var holding the integration token (never store the token itself).
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Database to pull pages from.
    #[serde(default)]
    pub database_id: String,

    /// API origin.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Value of the `Notion-Version` header.
    #[serde(default = "default_notion_version")]
    pub notion_version: String,

    /// Results requested per query page.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for NotionConfig {
    fn default() -> Self {
        Self {
            token_env: default_token_env(),
            database_id: String::new(),
            api_base: default_api_base(),
            notion_version: default_notion_version(),
            page_size: default_page_size(),
        }
    }
}

impl NotionConfig {
    /// `page_size` clamped to what the API accepts.
    pub fn effective_page_size(&self) -> u32 {
        self.page_size.clamp(1, MAX_PAGE_SIZE)
    }
}

fn default_token_env() -> String {
    "NOTION_TOKEN".into()
}
fn default_api_base() -> String {
    "https://api.notion.com".into()
}
fn default_notion_version() -> String {
    "2022-06-28".into()
}
fn default_page_size() -> u32 {
    MAX_PAGE_SIZE
}

/// `[properties]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyNames {
    /// Title property (first rich-text run is the page title).
    #[serde(default = "default_title_property")]
    pub title: String,

    /// Multi-select property holding tags.
    #[serde(default = "default_tags_property")]
    pub tags: String,

    /// Created-time property used for the front-matter date.
    #[serde(default = "default_created_property")]
    pub created: String,
}

impl Default for PropertyNames {
    fn default() -> Self {
        Self {
            title: default_title_property(),
            tags: default_tags_property(),
            created: default_created_property(),
        }
    }
}

fn default_title_property() -> String {
    "Name".into()
}
fn default_tags_property() -> String {
    "Tags".into()
}
fn default_created_property() -> String {
    "Created".into()
}

/// `[output]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Root of the generated content tree.
    #[serde(default = "default_content_root")]
    pub content_root: String,

    /// Value written to `categories` in every document.
    #[serde(default = "default_category")]
    pub category: String,

    /// Where to dump raw query responses, if anywhere.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dump_path: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            content_root: default_content_root(),
            category: default_category(),
            dump_path: None,
        }
    }
}

fn default_content_root() -> String {
    "content/posts".into()
}
fn default_category() -> String {
    "Journal".into()
}

/// `[sync]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncTuning {
    /// Pages synchronized at the same time.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for SyncTuning {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_concurrency() -> u32 {
    8
}
fn default_request_timeout() -> u64 {
    30
}

/// `[retry]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry.
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Upper bound for any single delay.
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Factor applied to the delay after each retry.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Randomize delays to spread out concurrent retries.
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Reject multipliers that would shrink, stall or overflow the delay.
    pub fn validate(&self) -> Result<()> {
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(SyncError::config(format!(
                "retry.backoff_multiplier must be a finite number >= 1.0, got {}",
                self.backoff_multiplier
            )));
        }
        Ok(())
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_initial_delay() -> u64 {
    500
}
fn default_max_delay() -> u64 {
    10_000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}
fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Sync config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime sync configuration, merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Database to pull pages from.
    pub database_id: String,
    /// Root of the generated content tree.
    pub content_root: PathBuf,
    /// Value written to `categories`.
    pub category: String,
    /// Property names to read.
    pub properties: PropertyNames,
    /// Maximum pages synchronized concurrently (at least 1).
    pub concurrency: usize,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Backoff policy.
    pub retry: RetryConfig,
    /// Optional raw-response dump file.
    pub dump_path: Option<PathBuf>,
}

impl From<&AppConfig> for SyncConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            database_id: config.notion.database_id.clone(),
            content_root: PathBuf::from(&config.output.content_root),
            category: config.output.category.clone(),
            properties: config.properties.clone(),
            concurrency: config.sync.concurrency.max(1) as usize,
            request_timeout: Duration::from_secs(config.sync.request_timeout_secs),
            retry: config.retry.clone(),
            dump_path: config.output.dump_path.as_ref().map(PathBuf::from),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.notionsync/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| SyncError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.notionsync/notionsync.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| SyncError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content)
        .map_err(|e| SyncError::config(format!("failed to parse {}: {e}", path.display())))?;
    config.retry.validate()?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| SyncError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content = toml::to_string_pretty(&config).map_err(|e| SyncError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| SyncError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the integration token from the env var named in the config.
pub fn resolve_token(config: &AppConfig) -> Result<String> {
    let var_name = &config.notion.token_env;
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val.trim().to_string()),
        _ => Err(SyncError::config(format!(
            "Notion integration token not found. Set the {var_name} environment variable.\n\
             Create an integration at https://www.notion.so/my-integrations"
        ))),
    }
}
