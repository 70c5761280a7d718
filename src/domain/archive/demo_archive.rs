use async_trait::async_trait;
use bytes::Bytes;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::Settings;
use crate::error::{Error, Result};

pub const DEMO_SUFFIX: &str = ".dem";

/// Upper bound on the buffer reserved from an entry's declared size. Larger entries grow as they are read.
const MAX_PREALLOC: usize = 16 * 1024 * 1024;

/// Post-match artifact storage.
#[async_trait]
pub trait DemoArchive: Send + Sync {
    async fn fetch_artifact(&self, url: &str) -> Result<Bytes>;

    /// Downloads the archive at `url` and keeps its demo as `<file_stem>.dem`.
    ///
    /// # Returns
    /// The stored path, or `None` when the archive holds no demo.
    async fn archive(&self, url: &str, file_stem: &str) -> Result<Option<PathBuf>>;
}

/// Returns the name and content of the first file entry whose name ends with `suffix`.
pub fn extract_matching(archive: &[u8], suffix: &str) -> Result<Option<(String, Vec<u8>)>> {
    let mut zip = zip::ZipArchive::new(Cursor::new(archive)).map_err(|e| Error::Archive(format!("not a zip archive: {}", e)))?;

    for index in 0..zip.len() {
        let mut entry = zip.by_index(index).map_err(|e| Error::Archive(format!("unreadable entry {}: {}", index, e)))?;
        if entry.is_dir() || !entry.name().ends_with(suffix) {
            continue;
        }
        let name = entry.name().to_string();
        let mut content = Vec::with_capacity(prealloc_capacity(entry.size()));
        entry.read_to_end(&mut content)?;
        return Ok(Some((name, content)));
    }
    Ok(None)
}

/// The declared size comes from the remote archive and is not trusted beyond `MAX_PREALLOC`.
fn prealloc_capacity(declared: u64) -> usize {
    usize::try_from(declared).unwrap_or(usize::MAX).min(MAX_PREALLOC)
}

/// Fetches artifacts over HTTP and writes extracted demos into one directory.
#[derive(Debug, Clone)]
pub struct HttpDemoArchive {
    http: reqwest::Client,
    demo_dir: PathBuf,
}

impl HttpDemoArchive {
    pub fn new(demo_dir: impl Into<PathBuf>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { http, demo_dir: demo_dir.into() })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        // Archives are much larger than API responses.
        Self::new(settings.demo_dir.clone(), settings.request_timeout * 6)
    }

    pub fn demo_dir(&self) -> &Path {
        &self.demo_dir
    }
}

#[async_trait]
impl DemoArchive for HttpDemoArchive {
    async fn fetch_artifact(&self, url: &str) -> Result<Bytes> {
        let response = self.http.get(url).send().await.map_err(|e| Error::Transport(format!("artifact download failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(Error::Transport(format!("artifact download from {} returned {}", url, response.status())));
        }
        response.bytes().await.map_err(|e| Error::Transport(format!("artifact download interrupted: {}", e)))
    }

    async fn archive(&self, url: &str, file_stem: &str) -> Result<Option<PathBuf>> {
        let bytes = self.fetch_artifact(url).await?;
        log::debug!("Downloaded {} bytes from {}", bytes.len(), url);

        let extracted = tokio::task::spawn_blocking(move || extract_matching(&bytes, DEMO_SUFFIX))
            .await
            .map_err(|e| Error::Archive(format!("extraction task failed: {}", e)))??;

        let Some((entry, content)) = extracted else {
            log::warn!("Archive {} contains no demo.", url);
            return Ok(None);
        };

        tokio::fs::create_dir_all(&self.demo_dir).await?;
        let target = self.demo_dir.join(format!("{}{}", file_stem, DEMO_SUFFIX));
        tokio::fs::write(&target, &content).await?;
        log::info!("Stored demo {} from {} as {}", entry, url, target.display());
        Ok(Some(target))
    }
}
