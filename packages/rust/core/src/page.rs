//! Synchronization of one page into its content directory.
//!
//! Layout written per page:
//!
//! ```text
//! <content_root>/<slug>/index.md
//! <content_root>/<slug>/featured.jpg
//! <content_root>/<slug>/.notion
//! <content_root>/<slug>/assets/<uuid>.jpg
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use notionsync_notion::{DEFAULT_MAX_DEPTH, PageSource, fetch_block_tree};
use notionsync_shared::{Page, Result, SyncError};

use crate::assets::AssetFetcher;
use crate::document::{FrontMatter, SyncMarker, render_document, slugify};
use crate::rewrite::{ASSET_DIR, rewrite};
use crate::write::write_atomic;

pub const INDEX_FILE: &str = "index.md";
pub const COVER_FILE: &str = "featured.jpg";
pub const MARKER_FILE: &str = ".notion";

/// Summary of one successfully synchronized page.
#[derive(Debug, Clone)]
pub struct PageOutcome {
    pub page_id: String,
    pub slug: String,
    pub dir: PathBuf,
    /// Whether a cover image was mirrored.
    pub cover: bool,
    /// Number of images mirrored into `assets/`.
    pub assets: usize,
    /// Blocks whose media kind is not mirrored yet.
    pub deferred: usize,
    pub word_count: usize,
    /// SHA-256 of the written `index.md`.
    pub content_hash: String,
}

/// Turns one page into its document, marker and mirrored media.
pub struct PageSynchronizer {
    source: Arc<dyn PageSource>,
    fetcher: AssetFetcher,
    content_root: PathBuf,
    category: String,
}

impl PageSynchronizer {
    pub fn new(
        source: Arc<dyn PageSource>,
        fetcher: AssetFetcher,
        content_root: impl Into<PathBuf>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            source,
            fetcher,
            content_root: content_root.into(),
            category: category.into(),
        }
    }

    /// Synchronize `page`, writing everything under `<content_root>/<slug>/`.
    ///
    /// The cover download overlaps with fetching the block tree. The document
    /// is only rendered once every image in the tree has been mirrored, and
    /// `index.md` and `.notion` are replaced atomically.
    #[instrument(skip_all, fields(page_id = %page.id))]
    pub async fn sync(&self, page: &Page) -> Result<PageOutcome> {
        let slug = slugify(&page.title)?;
        let page_dir = self.content_root.join(&slug);
        let asset_dir = page_dir.join(ASSET_DIR);

        tokio::fs::create_dir_all(&asset_dir)
            .await
            .map_err(|e| SyncError::io(&asset_dir, e))?;

        let cover_path = page_dir.join(COVER_FILE);
        let (cover, blocks) = tokio::join!(
            self.fetcher.fetch(&cover_path, Some(page.cover_url.as_str())),
            fetch_block_tree(self.source.as_ref(), &page.id, DEFAULT_MAX_DEPTH),
        );
        let cover = cover?;
        let blocks = blocks?;
        debug!(%slug, blocks = blocks.len(), "block tree fetched");

        let (blocks, report) = rewrite(&self.fetcher, &asset_dir, &blocks).await?;
        let converted = notionsync_markdown::convert(&blocks);

        let document = render_document(&FrontMatter::new(page, &self.category), &converted.markdown);
        write_atomic(&page_dir.join(INDEX_FILE), document.as_bytes()).await?;

        let marker = SyncMarker::new(page).render();
        write_atomic(&page_dir.join(MARKER_FILE), marker.as_bytes()).await?;

        let keep: HashSet<&str> = report.mirrored.iter().map(|a| a.file_name.as_str()).collect();
        prune_assets(&asset_dir, &keep).await;

        let outcome = PageOutcome {
            page_id: page.id.clone(),
            slug,
            dir: page_dir,
            cover: cover.is_some(),
            assets: report.mirrored.len(),
            deferred: report.deferred.len(),
            word_count: converted.word_count,
            content_hash: compute_hash(&document),
        };

        info!(
            slug = %outcome.slug,
            assets = outcome.assets,
            deferred = outcome.deferred,
            cover = outcome.cover,
            word_count = outcome.word_count,
            "page synchronized"
        );

        Ok(outcome)
    }
}

/// A content directory carrying a sync marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncedPage {
    pub slug: String,
    pub marker: SyncMarker,
}

/// Scan `content_root` for page directories with a readable sync marker.
///
/// Directories without a marker are skipped; an unreadable marker is logged
/// and skipped. Results are sorted by slug.
pub async fn list_synced(content_root: &Path) -> Result<Vec<SyncedPage>> {
    let mut entries = tokio::fs::read_dir(content_root)
        .await
        .map_err(|e| SyncError::io(content_root, e))?;

    let mut pages = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| SyncError::io(content_root, e))?
    {
        let marker_path = entry.path().join(MARKER_FILE);
        let content = match tokio::fs::read_to_string(&marker_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) if e.kind() == std::io::ErrorKind::NotADirectory => continue,
            Err(e) => {
                warn!(path = %marker_path.display(), error = %e, "unreadable sync marker");
                continue;
            }
        };

        match SyncMarker::parse(&content) {
            Ok(marker) => pages.push(SyncedPage {
                slug: entry.file_name().to_string_lossy().into_owned(),
                marker,
            }),
            Err(e) => warn!(path = %marker_path.display(), error = %e, "invalid sync marker"),
        }
    }

    pages.sort_by(|a, b| a.slug.cmp(&b.slug));
    Ok(pages)
}

/// Remove assets from earlier runs that the new document no longer links.
async fn prune_assets(asset_dir: &Path, keep: &HashSet<&str>) {
    let mut entries = match tokio::fs::read_dir(asset_dir).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %asset_dir.display(), error = %e, "cannot list asset directory");
            return;
        }
    };

    let mut removed = 0usize;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if keep.contains(name.as_ref()) {
            continue;
        }
        match tokio::fs::remove_file(entry.path()).await {
            Ok(()) => removed += 1,
            Err(e) => warn!(path = %entry.path().display(), error = %e, "failed to remove stale asset"),
        }
    }

    if removed > 0 {
        debug!(removed, "stale assets pruned");
    }
}

/// Compute SHA-256 hash of content.
fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
