//! HTTP implementation of [`PageSource`] against the Notion REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, instrument};
use url::Url;

use notionsync_shared::{AppConfig, Block, PageRecord, Result, RetryConfig, SyncError};

use crate::retry::with_retry;
use crate::{ListPage, PageSource};

/// User-Agent string for API and asset requests.
pub const USER_AGENT: &str = concat!("notionsync/", env!("CARGO_PKG_VERSION"));

/// Connection settings for [`NotionClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// API origin, e.g. `https://api.notion.com`.
    pub api_base: Url,
    /// Value of the `Notion-Version` header.
    pub notion_version: String,
    /// Results requested per list call.
    pub page_size: u32,
    /// Per-request timeout.
    pub timeout: Duration,
    pub retry: RetryConfig,
}

impl ClientOptions {
    /// Build options from the loaded application config.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let api_base = Url::parse(&config.notion.api_base).map_err(|e| {
            SyncError::config(format!("invalid api_base '{}': {e}", config.notion.api_base))
        })?;
        config.retry.validate()?;

        Ok(Self {
            api_base,
            notion_version: config.notion.notion_version.clone(),
            page_size: config.notion.effective_page_size(),
            timeout: Duration::from_secs(config.sync.request_timeout_secs),
            retry: config.retry.clone(),
        })
    }
}

/// Read-only client for database queries and block listings.
pub struct NotionClient {
    http: Client,
    token: String,
    options: ClientOptions,
}

impl NotionClient {
    /// Create a client authenticated with an integration token.
    pub fn new(token: impl Into<String>, options: ClientOptions) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(options.timeout)
            .build()
            .map_err(|e| SyncError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            token: token.into(),
            options,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.options
            .api_base
            .join(path)
            .map_err(|e| SyncError::config(format!("invalid endpoint path '{path}': {e}")))
    }

    /// Send one authenticated request and decode the JSON body.
    async fn execute(&self, request: RequestBuilder) -> Result<Value> {
        let response = request
            .bearer_auth(&self.token)
            .header("Notion-Version", &self.options.notion_version)
            .send()
            .await
            .map_err(|e| SyncError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SyncError::Network(format!("body read failed: {e}")))?;

        if !status.is_success() {
            let detail: ApiErrorBody = serde_json::from_str(&body).unwrap_or_default();
            return Err(SyncError::Api {
                status: status.as_u16(),
                code: detail.code,
                message: if detail.message.is_empty() {
                    body
                } else {
                    detail.message
                },
            });
        }

        serde_json::from_str(&body).map_err(|e| SyncError::Decode(e.to_string()))
    }
}

#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[async_trait]
impl PageSource for NotionClient {
    #[instrument(skip(self))]
    async fn query_database(
        &self,
        database_id: &str,
        start_cursor: Option<&str>,
    ) -> Result<ListPage<PageRecord>> {
        let url = self.endpoint(&format!("v1/databases/{database_id}/query"))?;
        let mut body = json!({ "page_size": self.options.page_size });
        if let Some(cursor) = start_cursor {
            body["start_cursor"] = json!(cursor);
        }

        debug!(%url, ?start_cursor, "querying database");
        let raw = with_retry(&self.options.retry, "database query", || {
            self.execute(self.http.post(url.clone()).json(&body))
        })
        .await?;

        ListPage::from_raw(raw)
    }

    #[instrument(skip(self))]
    async fn list_block_children(
        &self,
        block_id: &str,
        start_cursor: Option<&str>,
    ) -> Result<ListPage<Block>> {
        let mut url = self.endpoint(&format!("v1/blocks/{block_id}/children"))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("page_size", &self.options.page_size.to_string());
            if let Some(cursor) = start_cursor {
                query.append_pair("start_cursor", cursor);
            }
        }

        debug!(%url, "listing block children");
        let raw = with_retry(&self.options.retry, "block listing", || {
            self.execute(self.http.get(url.clone()))
        })
        .await?;

        ListPage::from_raw(raw)
    }
}
