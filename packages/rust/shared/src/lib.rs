//! Shared types, error model, and configuration for notionsync.
//!
//! This crate is the foundation depended on by all other notionsync crates.
//! It provides:
//! - [`SyncError`]: the unified error type
//! - Domain types ([`Page`], [`Block`], [`MediaSource`], [`RichText`])
//! - Configuration ([`AppConfig`], [`SyncConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, MAX_PAGE_SIZE, NotionConfig, OutputConfig, PropertyNames, RetryConfig, SyncConfig,
    SyncTuning, config_dir, config_file_path, init_config, load_config, load_config_from,
    resolve_token,
};
pub use error::{Result, SyncError};
pub use types::{
    Annotations, Block, BlockKind, CalloutBlock, ChildPageBlock, CodeBlock, EquationBlock,
    FileUrl, Icon, LinkBlock, MediaBlock, MediaSource, Page, PageRecord, RichText, TableBlock,
    TableRowBlock, TextBlock, TextContent, ToDoBlock, plain_text,
};
