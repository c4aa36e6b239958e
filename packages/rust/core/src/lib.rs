//! Sync pipeline for notionsync.
//!
//! This crate ties the source client and the Markdown converter together:
//! - [`SyncDriver`] queries a database and fans pages out over a bounded pool
//! - [`PageSynchronizer`] writes one page's document, marker and media
//! - [`rewrite`] mirrors image blocks into the page's asset directory
//! - [`AssetFetcher`] streams remote binaries to disk

pub mod assets;
pub mod diagnostics;
pub mod document;
pub mod page;
pub mod rewrite;
pub mod sync;
mod write;

#[cfg(test)]
mod testing;

pub use assets::{AssetFetcher, resolve_url};
pub use diagnostics::{DiagnosticSink, JsonFileSink, NoopSink};
pub use document::{FrontMatter, SyncMarker, render_document, slugify};
pub use page::{
    COVER_FILE, INDEX_FILE, MARKER_FILE, PageOutcome, PageSynchronizer, SyncedPage, list_synced,
};
pub use rewrite::{
    ASSET_DIR, DeferredBlock, MediaStrategy, MirroredAsset, RewriteReport, rewrite, strategy_for,
};
pub use sync::{PageFailure, ProgressReporter, SilentProgress, SyncDriver, SyncReport};
pub use write::write_atomic;
