//! Fetching forecast files from a model server's directory tree.
//!
//! Key features:
//! - Run folders are listed from the HTML index, files matched by substring
//! - Downloads stream to `<name>.partial` and are renamed once complete
//! - Exponential backoff retry on failures, resuming with HTTP Range
//! - Files already present in the destination are skipped

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use futures::StreamExt;
use reqwest::{header, Client, StatusCode, Url};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, instrument, warn};

use crate::listing::{cycle_folders, directory_url, file_name, grib_links, resolve_link};

/// Configuration for the download manager.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Initial retry delay (doubles each retry)
    pub initial_retry_delay: Duration,
    /// Maximum retry delay
    pub max_retry_delay: Duration,
    /// HTTP request timeout
    pub request_timeout: Duration,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_retry_delay: Duration::from_secs(2),
            max_retry_delay: Duration::from_secs(120),
            request_timeout: Duration::from_secs(600), // 10 minutes
        }
    }
}

/// What one [`DownloadManager::fetch_matching`] call did.
#[derive(Debug, Default)]
pub struct FetchSummary {
    pub downloaded: Vec<PathBuf>,
    /// Files already present in the destination.
    pub skipped: Vec<PathBuf>,
    /// URL and error of each file that could not be fetched.
    pub failed: Vec<(String, String)>,
}

impl FetchSummary {
    pub fn merge(&mut self, other: FetchSummary) {
        self.downloaded.extend(other.downloaded);
        self.skipped.extend(other.skipped);
        self.failed.extend(other.failed);
    }
}

/// Lists and downloads forecast files with retry support.
pub struct DownloadManager {
    client: Client,
    config: DownloadConfig,
}

impl DownloadManager {
    /// Create a new download manager with the given configuration.
    pub fn new(config: DownloadConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(4)
            .tcp_nodelay(true)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, config })
    }

    /// URLs of the numbered folders under `<base_url>/<run_hour>/`.
    #[instrument(skip(self))]
    pub async fn list_cycle_folders(&self, base_url: &str, run_hour: &str) -> Result<Vec<Url>> {
        let run = resolve_link(&directory_url(base_url)?, &format!("{}/", run_hour))?;
        let html = self.fetch_index(&run).await?;

        let folders = cycle_folders(&html)
            .iter()
            .map(|href| resolve_link(&run, href))
            .collect::<Result<Vec<_>>>()?;

        debug!(run = %run, folders = folders.len(), "Listed run folders");
        Ok(folders)
    }

    /// Download every `.grib2` file of `folder` whose name contains
    /// `pattern` into `dest`.
    ///
    /// Only a failure to list `folder` is an error; files that still fail
    /// after all retries are reported in [`FetchSummary::failed`].
    #[instrument(skip(self, folder, dest), fields(folder = %folder))]
    pub async fn fetch_matching(&self, folder: &Url, pattern: &str, dest: &Path) -> Result<FetchSummary> {
        fs::create_dir_all(dest)
            .await
            .with_context(|| format!("Failed to create {}", dest.display()))?;

        let html = self.fetch_index(folder).await?;
        let mut summary = FetchSummary::default();

        for href in grib_links(&html, pattern) {
            let url = resolve_link(folder, &href)?;
            let Some(name) = file_name(&url).map(str::to_string) else {
                continue;
            };

            let final_path = dest.join(&name);
            if final_path.exists() {
                debug!(path = %final_path.display(), "File already exists, skipping download");
                summary.skipped.push(final_path);
                continue;
            }

            match self.download(&url, &name, dest).await {
                Ok(path) => summary.downloaded.push(path),
                Err(e) => {
                    error!(url = %url, error = %e, "Download failed");
                    summary.failed.push((url.to_string(), e.to_string()));
                }
            }
        }

        info!(
            pattern = %pattern,
            downloaded = summary.downloaded.len(),
            skipped = summary.skipped.len(),
            failed = summary.failed.len(),
            "Fetched folder"
        );
        Ok(summary)
    }

    /// Download one file into `dest`, retrying with backoff.
    ///
    /// Returns the path to the completed download.
    pub async fn download(&self, url: &Url, filename: &str, dest: &Path) -> Result<PathBuf> {
        let temp_path = dest.join(format!("{}.partial", filename));
        let final_path = dest.join(filename);

        let partial = temp_path.as_path();
        self.with_retry(url.as_str(), move || self.download_with_resume(url, partial))
            .await?;

        fs::rename(&temp_path, &final_path)
            .await
            .with_context(|| format!("Failed to move {}", temp_path.display()))?;

        info!(path = %final_path.display(), "Download completed");
        Ok(final_path)
    }

    async fn fetch_index(&self, url: &Url) -> Result<String> {
        self.with_retry(url.as_str(), move || async move {
            let response = self
                .client
                .get(url.clone())
                .send()
                .await
                .context("HTTP request failed")?;
            if !response.status().is_success() {
                return Err(anyhow!("HTTP error: {}", response.status()));
            }
            response.text().await.context("Failed to read index page")
        })
        .await
    }

    /// Run `op` until it succeeds or the retries are used up.
    async fn with_retry<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut retry_count = 0;
        let mut delay = self.config.initial_retry_delay;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    retry_count += 1;
                    if retry_count > self.config.max_retries {
                        return Err(anyhow!(
                            "{} failed after {} retries: {}",
                            what,
                            self.config.max_retries,
                            e
                        ));
                    }

                    warn!(
                        target_url = %what,
                        error = %e,
                        retry = retry_count,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Request failed, retrying"
                    );

                    tokio::time::sleep(delay).await;

                    // Exponential backoff
                    delay = std::cmp::min(delay * 2, self.config.max_retry_delay);
                }
            }
        }
    }

    /// One download attempt, continuing a previous partial file when the
    /// server honours the Range header.
    async fn download_with_resume(&self, url: &Url, temp_path: &Path) -> Result<()> {
        let resume_from = match fs::metadata(temp_path).await {
            Ok(metadata) => metadata.len(),
            Err(_) => 0,
        };

        let mut request = self.client.get(url.clone());
        if resume_from > 0 {
            debug!(resume_from, "Resuming download");
            request = request.header(header::RANGE, format!("bytes={}-", resume_from));
        }

        let response = request.send().await.context("HTTP request failed")?;

        let append = match response.status() {
            StatusCode::OK => false,
            StatusCode::PARTIAL_CONTENT => true,
            StatusCode::RANGE_NOT_SATISFIABLE => {
                // Stale partial file; start over on the next attempt.
                fs::remove_file(temp_path).await.ok();
                return Err(anyhow!("Range not satisfiable, restarting download"));
            }
            status => return Err(anyhow!("HTTP error: {}", status)),
        };

        let expected = response.content_length();

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(temp_path)
            .await
            .context("Failed to open output file")?;

        let mut written = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("Error reading response chunk")?;
            file.write_all(&chunk)
                .await
                .context("Error writing to file")?;
            written += chunk.len() as u64;
        }

        file.flush().await?;
        file.sync_all().await?;

        if let Some(expected) = expected {
            if written != expected {
                return Err(anyhow!(
                    "Download size mismatch: expected {} bytes, got {}",
                    expected,
                    written
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Path as UrlPath;
    use axum::http::StatusCode as HttpStatus;
    use axum::routing::get;
    use axum::Router;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const LEAD_INDEX: &str = r#"<pre>
<a href="../">Parent Directory</a>
<a href="CMC_glb_TMP_ISBL_500_latlon.24x.24_2024010100_P003.grib2">a</a>
<a href="CMC_glb_TMP_ISBL_850_latlon.24x.24_2024010100_P003.grib2">b</a>
<a href="CMC_glb_DSWRF_SFC_0_latlon.24x.24_2024010100_P003.grib2">c</a>
</pre>"#;

    fn fast_config() -> DownloadConfig {
        DownloadConfig {
            max_retries: 3,
            initial_retry_delay: Duration::from_millis(10),
            max_retry_delay: Duration::from_millis(40),
            request_timeout: Duration::from_secs(10),
        }
    }

    /// Serve a fake model tree on an ephemeral port, returning its base URL.
    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/lat_lon/", addr)
    }

    fn model_tree() -> Router {
        Router::new()
            .route(
                "/lat_lon/00/",
                get(|| async { r#"<a href="?C=N;O=D">Name</a><a href="000/">000/</a><a href="003/">003/</a>"# }),
            )
            .route("/lat_lon/00/003/", get(|| async { LEAD_INDEX }))
            .route(
                "/lat_lon/00/003/:name",
                get(|UrlPath(name): UrlPath<String>| async move { format!("GRIB:{}", name) }),
            )
    }

    #[tokio::test]
    async fn test_list_cycle_folders() {
        let base = serve(model_tree()).await;
        let manager = DownloadManager::new(fast_config()).unwrap();

        let folders = manager.list_cycle_folders(&base, "00").await.unwrap();
        let folders: Vec<String> = folders.iter().map(|u| u.to_string()).collect();
        assert_eq!(folders, vec![format!("{}00/000/", base), format!("{}00/003/", base)]);
    }

    #[tokio::test]
    async fn test_fetch_matching_downloads_pattern() {
        let base = serve(model_tree()).await;
        let manager = DownloadManager::new(fast_config()).unwrap();
        let dest = tempfile::tempdir().unwrap();
        let folder = Url::parse(&format!("{}00/003/", base)).unwrap();

        let summary = manager
            .fetch_matching(&folder, "TMP_ISBL", dest.path())
            .await
            .unwrap();
        assert_eq!(summary.downloaded.len(), 2);
        assert!(summary.failed.is_empty());

        let name = "CMC_glb_TMP_ISBL_850_latlon.24x.24_2024010100_P003.grib2";
        let content = std::fs::read_to_string(dest.path().join(name)).unwrap();
        assert_eq!(content, format!("GRIB:{}", name));
        assert!(!dest.path().join(format!("{}.partial", name)).exists());
        assert!(!dest
            .path()
            .join("CMC_glb_DSWRF_SFC_0_latlon.24x.24_2024010100_P003.grib2")
            .exists());

        // A second pass finds everything in place.
        let again = manager
            .fetch_matching(&folder, "TMP_ISBL", dest.path())
            .await
            .unwrap();
        assert!(again.downloaded.is_empty());
        assert_eq!(again.skipped.len(), 2);
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_errors() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/lat_lon/00/003/flaky.grib2",
            get(move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(HttpStatus::SERVICE_UNAVAILABLE)
                    } else {
                        Ok("payload")
                    }
                }
            }),
        );
        let base = serve(app).await;
        let manager = DownloadManager::new(fast_config()).unwrap();
        let dest = tempfile::tempdir().unwrap();
        let url = Url::parse(&format!("{}00/003/flaky.grib2", base)).unwrap();

        let path = manager.download(&url, "flaky.grib2", dest.path()).await.unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "payload");
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let app = Router::new().route(
            "/lat_lon/00/003/gone.grib2",
            get(|| async { HttpStatus::NOT_FOUND }),
        );
        let base = serve(app).await;
        let manager = DownloadManager::new(fast_config()).unwrap();
        let dest = tempfile::tempdir().unwrap();
        let url = Url::parse(&format!("{}00/003/gone.grib2", base)).unwrap();

        let err = manager
            .download(&url, "gone.grib2", dest.path())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("after 3 retries"));
        assert!(!dest.path().join("gone.grib2").exists());
    }
}
