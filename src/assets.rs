//! Cover/poster resolution: source page → image URL → local file → CDN URL.
//!
//! Network access goes through the [`Fetcher`] trait. Every failure is
//! absorbed into a [`Resolution`] so one broken page never affects the
//! record's inclusion in the output.

use anyhow::{Context, Result};
use regex::Regex;
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, REFERER};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::FetchError;
use crate::models::MediaKind;
use crate::schedule::Clock;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const IMAGE_ACCEPT: &str = "image/webp,image/apng,image/*,*/*;q=0.8";

/// Ordered image URL patterns tried against a source page; first match wins.
pub fn default_patterns(kind: MediaKind) -> Vec<String> {
    let photo = |size: &str| {
        format!(r"https://img\d+\.doubanio\.com/view/photo/{size}/public/p\d+\.(?:jpg|webp)")
    };
    match kind {
        MediaKind::Movie => vec![photo("s_ratio_poster"), photo("l"), photo("m")],
        MediaKind::Book => vec![
            r"https://img\d+\.doubanio\.com/view/subject/[lm]/public/s\d+\.(?:jpg|webp)".to_string(),
            r"https://img\d+\.doubanio\.com/view/subject/s/public/s\d+\.(?:jpg|webp)".to_string(),
        ],
    }
}

/// Pick the first pattern that matches anywhere in the page.
pub fn extract_image_url(html: &str, patterns: &[Regex]) -> Option<String> {
    patterns
        .iter()
        .find_map(|re| re.find(html))
        .map(|m| m.as_str().to_string())
}

// ============================================================================
// CDN Template
// ============================================================================

/// `https://<host>/<repo>/<path>/<id>.jpg`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CdnTemplate {
    pub host: String,
    pub repo: String,
    pub path: String,
}

impl CdnTemplate {
    pub fn url(&self, id: &str) -> String {
        format!(
            "https://{}/{}/{}/{}.jpg",
            self.host.trim_matches('/'),
            self.repo.trim_matches('/'),
            self.path.trim_matches('/'),
            id
        )
    }
}

// ============================================================================
// Fetching
// ============================================================================

pub trait Fetcher {
    fn get_text(&self, url: &str, timeout: Duration) -> Result<String, FetchError>;
    fn get_bytes(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, FetchError>;
}

/// Blocking HTTP fetcher with browser-like headers.
pub struct HttpFetcher {
    client: Client,
    referer: String,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, referer: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            referer: referer.to_string(),
        })
    }

    fn send(
        &self,
        url: &str,
        accept: Option<&str>,
        timeout: Duration,
    ) -> Result<reqwest::blocking::Response, FetchError> {
        let mut request = self
            .client
            .get(url)
            .header(REFERER, self.referer.as_str())
            .timeout(timeout);
        if let Some(accept) = accept {
            request = request.header(ACCEPT, accept);
        }
        let response = request.send().map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }
        Ok(response)
    }
}

fn transport_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Transport(e.to_string())
    }
}

impl Fetcher for HttpFetcher {
    fn get_text(&self, url: &str, timeout: Duration) -> Result<String, FetchError> {
        self.send(url, None, timeout)?.text().map_err(transport_error)
    }

    fn get_bytes(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, FetchError> {
        let bytes = self
            .send(url, Some(IMAGE_ACCEPT), timeout)?
            .bytes()
            .map_err(transport_error)?;
        Ok(bytes.to_vec())
    }
}

// ============================================================================
// Resolution
// ============================================================================

/// Outcome of resolving one record's image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Fetched and saved during this run
    Downloaded(String),
    /// `<id>.jpg` was already on disk
    Cached(String),
    Failed(String),
    /// Record has no source URL
    NoSource,
}

impl Resolution {
    /// CDN URL to store on the record, if any.
    pub fn url(&self) -> Option<&str> {
        match self {
            Resolution::Downloaded(url) | Resolution::Cached(url) => Some(url.as_str()),
            Resolution::Failed(_) | Resolution::NoSource => None,
        }
    }

    /// Whether this outcome involved a request and should be paced.
    pub fn touched_network(&self) -> bool {
        matches!(self, Resolution::Downloaded(_) | Resolution::Failed(_))
    }
}

pub trait AssetResolver {
    fn resolve_image(&self, source_url: &str, id: &str, clock: &dyn Clock) -> Resolution;
}

/// Timeouts and retry budget for one resolver.
#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub page_timeout: Duration,
    pub image_timeout: Duration,
    pub retries: u32,
    pub retry_backoff: Duration,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            page_timeout: Duration::from_secs(15),
            image_timeout: Duration::from_secs(25),
            retries: 2,
            retry_backoff: Duration::from_millis(2_000),
        }
    }
}

/// Page-scraping resolver saving images as `<dir>/<id>.jpg`.
pub struct ImageResolver<F: Fetcher> {
    fetcher: F,
    dir: PathBuf,
    cdn: CdnTemplate,
    patterns: Vec<Regex>,
    settings: ResolverSettings,
}

impl<F: Fetcher> ImageResolver<F> {
    pub fn new(
        fetcher: F,
        dir: impl Into<PathBuf>,
        cdn: CdnTemplate,
        patterns: &[String],
        settings: ResolverSettings,
    ) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| Regex::new(p).with_context(|| format!("Invalid image pattern: {}", p)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            fetcher,
            dir: dir.into(),
            cdn,
            patterns,
            settings,
        })
    }

    pub fn local_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.jpg", id))
    }

    /// Run `op`, retrying transient failures with linear backoff.
    fn with_retry<T>(
        &self,
        clock: &dyn Clock,
        what: &str,
        mut op: impl FnMut() -> Result<T, FetchError>,
    ) -> Result<T, FetchError> {
        let mut attempt = 0u32;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.settings.retries => {
                    attempt += 1;
                    debug!(what, attempt, error = %e, "retrying");
                    clock.sleep(self.settings.retry_backoff * attempt);
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn download(&self, source_url: &str, target: &Path, clock: &dyn Clock) -> Result<(), String> {
        let html = self
            .with_retry(clock, "page", || {
                self.fetcher.get_text(source_url, self.settings.page_timeout)
            })
            .map_err(|e| format!("page fetch failed: {}", e))?;

        let image_url = extract_image_url(&html, &self.patterns)
            .ok_or_else(|| "no image URL found in page".to_string())?;

        let bytes = self
            .with_retry(clock, "image", || {
                self.fetcher.get_bytes(&image_url, self.settings.image_timeout)
            })
            .map_err(|e| format!("image fetch failed: {}", e))?;

        save_atomically(target, &bytes).map_err(|e| format!("saving image failed: {}", e))
    }
}

/// Write to `<target>.part` then rename, so a failure never leaves a
/// truncated file under the final name.
fn save_atomically(target: &Path, bytes: &[u8]) -> Result<(), FetchError> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut part = target.as_os_str().to_owned();
    part.push(".part");
    let part = PathBuf::from(part);
    fs::write(&part, bytes)?;
    if let Err(e) = fs::rename(&part, target) {
        let _ = fs::remove_file(&part);
        return Err(e.into());
    }
    Ok(())
}

impl<F: Fetcher> AssetResolver for ImageResolver<F> {
    fn resolve_image(&self, source_url: &str, id: &str, clock: &dyn Clock) -> Resolution {
        let target = self.local_path(id);
        if target.exists() {
            return Resolution::Cached(self.cdn.url(id));
        }
        if source_url.trim().is_empty() {
            return Resolution::NoSource;
        }
        match self.download(source_url, &target, clock) {
            Ok(()) => Resolution::Downloaded(self.cdn.url(id)),
            Err(reason) => Resolution::Failed(reason),
        }
    }
}
