//! Block rewriting: mirror image media locally and repoint the blocks at it.
//!
//! Every block in the tree is assigned a [`MediaStrategy`]. Images with a
//! resolvable URL are mirrored into the page's asset directory under a fresh
//! random name and their URL is replaced with `assets/<name>`, keeping the
//! original location variant. Video mirroring is not implemented yet and is
//! reported as deferred. Embeds are only inspected.

use std::path::Path;

use futures::future::join_all;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use notionsync_shared::{Block, BlockKind, Result};

use crate::assets::{AssetFetcher, resolve_url};

/// Directory, relative to the page directory, that holds mirrored media.
pub const ASSET_DIR: &str = "assets";

/// Extension given to every mirrored file, whatever the source format.
pub const ASSET_EXTENSION: &str = "jpg";

/// How the rewriter treats one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaStrategy {
    /// Download the binary and point the block at the local copy.
    Mirror { url: String },
    /// Media kind whose mirroring is not built yet; the block is kept as is.
    NotImplemented { kind: &'static str },
    /// Logged for diagnostics, kept as is.
    Inspect,
    /// Nothing to do.
    PassThrough,
}

/// Decide the strategy for one block, ignoring its children.
pub fn strategy_for(block: &Block) -> MediaStrategy {
    match &block.kind {
        BlockKind::Image(media) => match resolve_url(&media.source) {
            Some(url) => MediaStrategy::Mirror {
                url: url.to_string(),
            },
            None => MediaStrategy::PassThrough,
        },
        BlockKind::Video(_) => MediaStrategy::NotImplemented { kind: "video" },
        BlockKind::Embed(_) => MediaStrategy::Inspect,
        _ => MediaStrategy::PassThrough,
    }
}

/// One image mirrored during a rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirroredAsset {
    pub block_id: String,
    pub source_url: String,
    /// Generated file name inside the asset directory.
    pub file_name: String,
}

impl MirroredAsset {
    /// The link written into the block, relative to the page directory.
    pub fn relative_path(&self) -> String {
        format!("{ASSET_DIR}/{}", self.file_name)
    }
}

/// A block left untouched because its media kind is not supported yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredBlock {
    pub block_id: String,
    pub kind: &'static str,
}

/// What a rewrite did, for callers and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteReport {
    pub mirrored: Vec<MirroredAsset>,
    pub deferred: Vec<DeferredBlock>,
    pub inspected: usize,
}

/// Produce a rewritten copy of `blocks`, mirroring every image into `asset_dir`.
///
/// Downloads run concurrently and all of them settle before this returns.
/// If any download fails the first error is returned and the rewritten
/// blocks are discarded, so no block ever links to a missing file.
#[instrument(skip_all, fields(asset_dir = %asset_dir.display(), blocks = blocks.len()))]
pub async fn rewrite(
    fetcher: &AssetFetcher,
    asset_dir: &Path,
    blocks: &[Block],
) -> Result<(Vec<Block>, RewriteReport)> {
    let mut rewritten = blocks.to_vec();
    let mut report = RewriteReport::default();
    plan(&mut rewritten, &mut report);

    let downloads = report.mirrored.iter().map(|asset| {
        let dest = asset_dir.join(&asset.file_name);
        async move { fetcher.fetch(&dest, Some(&asset.source_url)).await }
    });
    for result in join_all(downloads).await {
        result?;
    }

    info!(
        mirrored = report.mirrored.len(),
        deferred = report.deferred.len(),
        inspected = report.inspected,
        "blocks rewritten"
    );

    Ok((rewritten, report))
}

/// Assign file names and repoint image blocks, depth first.
fn plan(blocks: &mut [Block], report: &mut RewriteReport) {
    for block in blocks {
        match strategy_for(block) {
            MediaStrategy::Mirror { url } => {
                let asset = MirroredAsset {
                    block_id: block.id.clone(),
                    source_url: url,
                    file_name: format!("{}.{ASSET_EXTENSION}", Uuid::new_v4()),
                };
                if let BlockKind::Image(media) = &mut block.kind {
                    media.source.set_url(asset.relative_path());
                }
                report.mirrored.push(asset);
            }
            MediaStrategy::NotImplemented { kind } => {
                debug!(block_id = %block.id, kind, "media mirroring not implemented, block kept");
                report.deferred.push(DeferredBlock {
                    block_id: block.id.clone(),
                    kind,
                });
            }
            MediaStrategy::Inspect => {
                if let BlockKind::Embed(embed) = &block.kind {
                    debug!(block_id = %block.id, url = %embed.url, "embed block");
                }
                report.inspected += 1;
            }
            MediaStrategy::PassThrough => {}
        }

        plan(&mut block.children, report);
    }
}
