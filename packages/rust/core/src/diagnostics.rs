//! Optional sinks for raw query responses.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use notionsync_shared::{Result, SyncError};

use crate::write::write_atomic;

/// Receives the raw database query responses of a sync run.
#[async_trait]
pub trait DiagnosticSink: Send + Sync {
    async fn record_query(&self, database_id: &str, responses: &[Value]) -> Result<()>;
}

/// Discards everything.
pub struct NoopSink;

#[async_trait]
impl DiagnosticSink for NoopSink {
    async fn record_query(&self, _database_id: &str, _responses: &[Value]) -> Result<()> {
        Ok(())
    }
}

/// Writes the responses to one file as a pretty-printed JSON array.
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl DiagnosticSink for JsonFileSink {
    async fn record_query(&self, database_id: &str, responses: &[Value]) -> Result<()> {
        let json = serde_json::to_string_pretty(responses)
            .map_err(|e| SyncError::Decode(format!("failed to serialize query dump: {e}")))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SyncError::io(parent, e))?;
        }
        write_atomic(&self.path, json.as_bytes()).await?;

        info!(
            database_id,
            path = %self.path.display(),
            responses = responses.len(),
            "query responses dumped"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    #[tokio::test]
    async fn json_sink_writes_pretty_array() {
        let dir = std::env::temp_dir().join(format!("notionsync-dump-{}", Uuid::now_v7()));
        let path = dir.join("nested").join("ndata.json");
        let responses = vec![
            json!({ "object": "list", "results": [{ "id": "p1" }], "has_more": true }),
            json!({ "object": "list", "results": [{ "id": "p2" }], "has_more": false }),
        ];

        JsonFileSink::new(&path).record_query("db", &responses).await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("[\n"));
        let parsed: Vec<Value> = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, responses);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn noop_sink_accepts_anything() {
        NoopSink.record_query("db", &[json!({})]).await.unwrap();
    }
}
