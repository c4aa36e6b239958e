//! Read-only access to the source page database.
//!
//! This crate provides:
//! - [`PageSource`]: the seam between the sync pipeline and the remote API
//! - [`NotionClient`]: the HTTPS implementation of that seam
//! - [`query_all_pages`] / [`fetch_block_tree`]: cursor-following helpers
//! - [`with_retry`]: bounded backoff shared with asset downloads

mod client;
pub mod retry;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use notionsync_shared::{Block, BlockKind, PageRecord, Result, SyncError};

pub use client::{ClientOptions, NotionClient, USER_AGENT};
pub use retry::with_retry;

/// Deepest block nesting followed by [`fetch_block_tree`].
pub const DEFAULT_MAX_DEPTH: usize = 16;

// ---------------------------------------------------------------------------
// PageSource
// ---------------------------------------------------------------------------

/// One page of a paginated list response.
#[derive(Debug, Clone)]
pub struct ListPage<T> {
    pub results: Vec<T>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
    /// The response exactly as received, for diagnostics.
    pub raw: Value,
}

#[derive(Deserialize)]
struct ListEnvelope<T> {
    results: Vec<T>,
    #[serde(default)]
    next_cursor: Option<String>,
    #[serde(default)]
    has_more: bool,
}

impl<T: DeserializeOwned> ListPage<T> {
    /// Decode a raw list response, keeping the original JSON alongside.
    pub fn from_raw(raw: Value) -> Result<Self> {
        let envelope = ListEnvelope::<T>::deserialize(&raw)
            .map_err(|e| SyncError::Decode(format!("unexpected list response: {e}")))?;

        Ok(Self {
            results: envelope.results,
            next_cursor: envelope.next_cursor,
            has_more: envelope.has_more,
            raw,
        })
    }
}

/// Read-only operations the sync pipeline needs from the source database.
///
/// Implementations must be shareable across concurrently running page tasks.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetch one page of database query results.
    async fn query_database(
        &self,
        database_id: &str,
        start_cursor: Option<&str>,
    ) -> Result<ListPage<PageRecord>>;

    /// Fetch one page of the direct children of a block or page.
    async fn list_block_children(
        &self,
        block_id: &str,
        start_cursor: Option<&str>,
    ) -> Result<ListPage<Block>>;
}

// ---------------------------------------------------------------------------
// Cursor-following helpers
// ---------------------------------------------------------------------------

/// Every page record of a database, plus each raw response page.
#[derive(Debug, Clone, Default)]
pub struct DatabaseSnapshot {
    pub records: Vec<PageRecord>,
    pub responses: Vec<Value>,
}

/// Query a database, following continuation cursors until exhausted.
#[instrument(skip(source))]
pub async fn query_all_pages(source: &dyn PageSource, database_id: &str) -> Result<DatabaseSnapshot> {
    let mut snapshot = DatabaseSnapshot::default();
    let mut cursor: Option<String> = None;

    loop {
        let page = source.query_database(database_id, cursor.as_deref()).await?;
        debug!(
            results = page.results.len(),
            has_more = page.has_more,
            "received query page"
        );

        snapshot.records.extend(page.results);
        snapshot.responses.push(page.raw);

        match page.next_cursor {
            Some(next) if page.has_more => cursor = Some(next),
            _ => break,
        }
    }

    info!(
        pages = snapshot.records.len(),
        requests = snapshot.responses.len(),
        "database query complete"
    );

    Ok(snapshot)
}

/// List all direct children of a block, following cursors.
pub async fn list_all_children(source: &dyn PageSource, block_id: &str) -> Result<Vec<Block>> {
    let mut blocks = Vec::new();
    let mut cursor: Option<String> = None;

    loop {
        let page = source.list_block_children(block_id, cursor.as_deref()).await?;
        blocks.extend(page.results);

        match page.next_cursor {
            Some(next) if page.has_more => cursor = Some(next),
            _ => break,
        }
    }

    Ok(blocks)
}

/// Fetch a page's blocks with nested content resolved into `children`.
///
/// Child pages are traversed like any other container, so their content is
/// rendered inline. Nesting deeper than `max_depth` is left unresolved.
pub fn fetch_block_tree<'a>(
    source: &'a dyn PageSource,
    block_id: &'a str,
    max_depth: usize,
) -> BoxFuture<'a, Result<Vec<Block>>> {
    async move {
        let mut blocks = list_all_children(source, block_id).await?;

        for block in &mut blocks {
            let nested = block.has_children || matches!(block.kind, BlockKind::ChildPage(_));
            if !nested {
                continue;
            }
            if max_depth == 0 {
                warn!(block_id = %block.id, "block nesting too deep, children skipped");
                continue;
            }

            let id = block.id.clone();
            block.children = fetch_block_tree(source, &id, max_depth - 1).await?;
        }

        Ok(blocks)
    }
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use serde_json::json;

    /// In-memory source keyed by block id, serving children in fixed-size pages.
    struct FakeSource {
        children: HashMap<String, Vec<Value>>,
        records: Vec<Value>,
        per_page: usize,
        calls: Mutex<Vec<String>>,
    }

    impl FakeSource {
        fn paginate<T: DeserializeOwned>(
            &self,
            items: &[Value],
            cursor: Option<&str>,
        ) -> Result<ListPage<T>> {
            let start: usize = cursor.map(|c| c.parse().unwrap()).unwrap_or(0);
            let end = (start + self.per_page).min(items.len());
            let has_more = end < items.len();
            let next_cursor = has_more.then(|| end.to_string());
            let results = items[start..end].to_vec();
            ListPage::from_raw(json!({
                "object": "list",
                "results": results,
                "next_cursor": next_cursor,
                "has_more": has_more,
            }))
        }
    }

    #[async_trait]
    impl PageSource for FakeSource {
        async fn query_database(
            &self,
            database_id: &str,
            start_cursor: Option<&str>,
        ) -> Result<ListPage<PageRecord>> {
            self.calls.lock().unwrap().push(format!("query:{database_id}"));
            self.paginate(&self.records, start_cursor)
        }

        async fn list_block_children(
            &self,
            block_id: &str,
            start_cursor: Option<&str>,
        ) -> Result<ListPage<Block>> {
            self.calls.lock().unwrap().push(format!("children:{block_id}"));
            let items = self.children.get(block_id).cloned().unwrap_or_default();
            self.paginate(&items, start_cursor)
        }
    }

    fn paragraph(id: &str, text: &str, has_children: bool) -> Value {
        json!({
            "id": id,
            "type": "paragraph",
            "has_children": has_children,
            "paragraph": { "rich_text": [{ "type": "text", "plain_text": text }] }
        })
    }

    fn record(id: &str) -> Value {
        json!({ "id": id, "created_time": "2024-03-01T10:00:00.000Z", "properties": {} })
    }

    #[tokio::test]
    async fn query_follows_cursors_until_exhausted() {
        let source = FakeSource {
            children: HashMap::new(),
            records: (0..5).map(|i| record(&format!("p{i}"))).collect(),
            per_page: 2,
            calls: Mutex::new(Vec::new()),
        };

        let snapshot = query_all_pages(&source, "db").await.unwrap();

        let ids: Vec<_> = snapshot.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["p0", "p1", "p2", "p3", "p4"]);
        assert_eq!(snapshot.responses.len(), 3);
    }

    #[tokio::test]
    async fn block_tree_resolves_nested_children_and_child_pages() {
        let mut children = HashMap::new();
        children.insert(
            "page".to_string(),
            vec![
                paragraph("a", "top", true),
                json!({
                    "id": "sub",
                    "type": "child_page",
                    "has_children": false,
                    "child_page": { "title": "Appendix" }
                }),
                paragraph("b", "last", false),
            ],
        );
        children.insert("a".to_string(), vec![paragraph("a1", "nested", false)]);
        children.insert("sub".to_string(), vec![paragraph("s1", "inside", false)]);

        let source = FakeSource {
            children,
            records: vec![],
            per_page: 2,
            calls: Mutex::new(Vec::new()),
        };

        let tree = fetch_block_tree(&source, "page", DEFAULT_MAX_DEPTH).await.unwrap();

        assert_eq!(tree.len(), 3);
        assert_eq!(tree[0].children.len(), 1);
        assert_eq!(tree[0].children[0].id, "a1");
        assert_eq!(tree[1].children[0].id, "s1");
        assert!(tree[2].children.is_empty());

        let calls = source.calls.lock().unwrap();
        assert!(!calls.contains(&"children:b".to_string()));
    }

    #[tokio::test]
    async fn block_tree_stops_at_max_depth() {
        let mut children = HashMap::new();
        children.insert("page".to_string(), vec![paragraph("a", "1", true)]);
        children.insert("a".to_string(), vec![paragraph("b", "2", true)]);
        children.insert("b".to_string(), vec![paragraph("c", "3", false)]);

        let source = FakeSource {
            children,
            records: vec![],
            per_page: 10,
            calls: Mutex::new(Vec::new()),
        };

        let tree = fetch_block_tree(&source, "page", 1).await.unwrap();
        assert_eq!(tree[0].children.len(), 1);
        assert!(tree[0].children[0].children.is_empty());
    }
}
