//! Media mirroring: resolve a media location and stream it to disk.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

use notionsync_notion::{USER_AGENT, with_retry};
use notionsync_shared::{MediaSource, Result, RetryConfig, SyncError};

use crate::write::temp_path;

/// The single URL to fetch for a media location, if it has one.
pub fn resolve_url(source: &MediaSource) -> Option<&str> {
    Some(source.url()).filter(|url| !url.is_empty())
}

/// Streams remote binaries into local files.
///
/// Cheap to clone; clones share one connection pool.
#[derive(Debug, Clone)]
pub struct AssetFetcher {
    http: Client,
    retry: RetryConfig,
}

impl AssetFetcher {
    /// `timeout` bounds connecting and each individual read, never the whole
    /// transfer, so a large body that keeps arriving is never cut off.
    pub fn new(timeout: Duration, retry: RetryConfig) -> Result<Self> {
        retry.validate()?;
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()
            .map_err(|e| SyncError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, retry })
    }

    /// Download `url` to `dest`, replacing any existing file.
    ///
    /// An absent or empty URL is a no-op that writes nothing and returns
    /// `Ok(None)`. On success the written path is returned.
    #[instrument(skip(self, dest), fields(dest = %dest.display()))]
    pub async fn fetch(&self, dest: &Path, url: Option<&str>) -> Result<Option<PathBuf>> {
        let Some(url) = url.filter(|u| !u.is_empty()) else {
            debug!("no source url, nothing to mirror");
            return Ok(None);
        };

        let bytes = with_retry(&self.retry, "asset download", || self.download_once(dest, url)).await?;
        debug!(url, bytes, "asset mirrored");

        Ok(Some(dest.to_path_buf()))
    }

    /// One streaming attempt. The temporary file is removed on failure.
    async fn download_once(&self, dest: &Path, url: &str) -> Result<u64> {
        let temp = temp_path(dest);
        let result = self.stream_to(&temp, url).await;

        match result {
            Ok(bytes) => {
                tokio::fs::rename(&temp, dest)
                    .await
                    .map_err(|e| SyncError::io(dest, e))?;
                Ok(bytes)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&temp).await;
                Err(e)
            }
        }
    }

    async fn stream_to(&self, path: &Path, url: &str) -> Result<u64> {
        let mut response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| SyncError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Http {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let mut file = tokio::fs::File::create(path)
            .await
            .map_err(|e| SyncError::io(path, e))?;
        let mut written = 0u64;

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| SyncError::Network(format!("{url}: {e}")))?
        {
            file.write_all(&chunk)
                .await
                .map_err(|e| SyncError::io(path, e))?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(|e| SyncError::io(path, e))?;

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;
    use uuid::Uuid;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> AssetFetcher {
        AssetFetcher::new(
            Duration::from_secs(5),
            RetryConfig {
                max_attempts: 1,
                initial_delay_ms: 1,
                max_delay_ms: 2,
                backoff_multiplier: 2.0,
                jitter: false,
            },
        )
        .unwrap()
    }

    fn temp_dir(label: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("notionsync-{label}-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn resolve_url_prefers_populated_location() {
        assert_eq!(
            resolve_url(&MediaSource::external("https://x/a.png")),
            Some("https://x/a.png")
        );
        assert_eq!(
            resolve_url(&MediaSource::hosted("https://s3/b.png")),
            Some("https://s3/b.png")
        );
        assert_eq!(resolve_url(&MediaSource::hosted("")), None);
    }

    #[test]
    fn rejects_shrinking_backoff() {
        let retry = RetryConfig {
            backoff_multiplier: -1.0,
            ..RetryConfig::default()
        };
        let err = AssetFetcher::new(Duration::from_secs(1), retry).unwrap_err();
        assert!(matches!(err, SyncError::Config { .. }));
    }

    #[tokio::test]
    async fn absent_url_writes_nothing() {
        let dir = temp_dir("noop");
        let dest = dir.join("featured.jpg");

        assert!(fetcher().fetch(&dest, None).await.unwrap().is_none());
        assert!(fetcher().fetch(&dest, Some("")).await.unwrap().is_none());
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn downloads_body_to_destination() {
        let server = MockServer::start().await;
        let body = vec![7u8; 64 * 1024];
        Mock::given(method("GET"))
            .and(path("/photo.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = temp_dir("download");
        let dest = dir.join("photo.jpg");
        let url = format!("{}/photo.png", server.uri());

        let written = fetcher().fetch(&dest, Some(&url)).await.unwrap();

        assert_eq!(written.as_deref(), Some(dest.as_path()));
        assert_eq!(std::fs::read(&dest).unwrap(), body);
        assert!(!temp_path(&dest).exists());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn failed_download_leaves_no_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone.png"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = temp_dir("failed");
        let dest = dir.join("gone.jpg");
        let url = format!("{}/gone.png", server.uri());

        let err = fetcher().fetch(&dest, Some(&url)).await.unwrap_err();

        assert!(matches!(err, SyncError::Http { status: 404, .. }));
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn server_errors_are_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky.png"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ok".to_vec()))
            .mount(&server)
            .await;

        let dir = temp_dir("retry");
        let dest = dir.join("flaky.jpg");
        let url = format!("{}/flaky.png", server.uri());

        fetcher().fetch(&dest, Some(&url)).await.unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"ok");

        std::fs::remove_dir_all(&dir).ok();
    }

    /// Serve one response on a raw socket, sending the body a byte at a time.
    async fn trickle_server(body: &'static [u8], pause: Duration, stall: bool) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;

            let head = format!(
                "HTTP/1.1 200 OK\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
                body.len()
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            if stall {
                tokio::time::sleep(Duration::from_secs(30)).await;
                return;
            }
            for byte in body {
                tokio::time::sleep(pause).await;
                if socket.write_all(&[*byte]).await.is_err() {
                    return;
                }
                let _ = socket.flush().await;
            }
        });

        format!("http://{addr}/slow.png")
    }

    #[tokio::test]
    async fn slow_steady_body_outlasts_the_timeout() {
        let url = trickle_server(b"0123456789", Duration::from_millis(300), false).await;
        let dir = temp_dir("slow");
        let dest = dir.join("slow.jpg");

        let fetcher = AssetFetcher::new(Duration::from_secs(1), RetryConfig::none()).unwrap();
        fetcher.fetch(&dest, Some(&url)).await.unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"0123456789");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn stalled_body_times_out() {
        let url = trickle_server(b"0123456789", Duration::ZERO, true).await;
        let dir = temp_dir("stalled");
        let dest = dir.join("stalled.jpg");

        let fetcher = AssetFetcher::new(Duration::from_millis(500), RetryConfig::none()).unwrap();
        let err = fetcher.fetch(&dest, Some(&url)).await.unwrap_err();

        assert!(matches!(err, SyncError::Network(_)));
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);

        std::fs::remove_dir_all(&dir).ok();
    }
}
