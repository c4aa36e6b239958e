//! In-memory page source and fixtures shared by the pipeline tests.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use uuid::Uuid;

use notionsync_notion::{ListPage, PageSource};
use notionsync_shared::{Block, PageRecord, Result, SyncError};

/// Serves fixed records and block children; every list fits in one response.
#[derive(Default)]
pub(crate) struct FakeSource {
    pub records: Vec<Value>,
    pub children: HashMap<String, Vec<Value>>,
    /// Block ids whose listing fails with a permanent API error.
    pub failing: HashSet<String>,
    /// Artificial latency for block listings.
    pub delay: Option<Duration>,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub calls: Mutex<Vec<String>>,
}

fn list(results: Vec<Value>) -> Value {
    json!({ "object": "list", "results": results, "next_cursor": null, "has_more": false })
}

#[async_trait]
impl PageSource for FakeSource {
    async fn query_database(
        &self,
        database_id: &str,
        _start_cursor: Option<&str>,
    ) -> Result<ListPage<PageRecord>> {
        self.calls.lock().unwrap().push(format!("query:{database_id}"));
        ListPage::from_raw(list(self.records.clone()))
    }

    async fn list_block_children(
        &self,
        block_id: &str,
        _start_cursor: Option<&str>,
    ) -> Result<ListPage<Block>> {
        self.calls.lock().unwrap().push(format!("children:{block_id}"));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.contains(block_id) {
            return Err(SyncError::Api {
                status: 404,
                code: "object_not_found".into(),
                message: format!("Could not find block with ID: {block_id}"),
            });
        }
        let items = self.children.get(block_id).cloned().unwrap_or_default();
        ListPage::from_raw(list(items))
    }
}

/// A database record with the default property names.
pub(crate) fn record(id: &str, title: &str, tags: &[&str], cover: Option<&str>) -> Value {
    let tags: Vec<Value> = tags.iter().map(|t| json!({ "name": t })).collect();
    let cover = cover.map(|url| json!({ "type": "external", "external": { "url": url } }));
    json!({
        "object": "page",
        "id": id,
        "created_time": "2024-03-01T10:00:00.000Z",
        "icon": { "type": "emoji", "emoji": "🌍" },
        "cover": cover,
        "properties": {
            "Name": { "type": "title", "title": [{ "type": "text", "plain_text": title }] },
            "Tags": { "type": "multi_select", "multi_select": tags },
            "Created": { "type": "created_time", "created_time": "2024-03-01T10:00:00.000Z" }
        }
    })
}

pub(crate) fn image_block(id: &str, url: &str) -> Value {
    json!({
        "object": "block",
        "id": id,
        "type": "image",
        "has_children": false,
        "image": { "type": "external", "external": { "url": url }, "caption": [] }
    })
}

pub(crate) fn paragraph_block(id: &str, text: &str) -> Value {
    json!({
        "object": "block",
        "id": id,
        "type": "paragraph",
        "has_children": false,
        "paragraph": { "rich_text": [{ "type": "text", "plain_text": text }] }
    })
}

/// A fresh, empty directory under the system temp dir.
pub(crate) fn temp_root(label: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("notionsync-{label}-{}", Uuid::now_v7()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}
