//! Entity logo store.
//!
//! Layout: `{image_dir}/{sanitized_lowercase_name}.png`
//!
//! Logos are a side product of harvesting. Every failure here is logged and
//! reported as `None`; nothing in this module can fail a run.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tracing::{debug, warn};

use super::provider::DataError;

/// Something that can download raw image bytes.
pub trait ImageSource: Send + Sync {
    fn download(&self, url: &str) -> Result<Vec<u8>, DataError>;
}

/// Blocking HTTP image source.
pub struct HttpImageSource {
    client: reqwest::blocking::Client,
}

impl HttpImageSource {
    pub fn new(timeout: Duration) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DataError::Other(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl ImageSource for HttpImageSource {
    fn download(&self, url: &str) -> Result<Vec<u8>, DataError> {
        let resp = self
            .client
            .get(url)
            .send()
            .map_err(|e| DataError::NetworkUnreachable(e.to_string()))?;
        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(DataError::RateLimited {
                retry_after_secs: 60,
            });
        }
        if !status.is_success() {
            return Err(DataError::Other(format!("HTTP {status} for {url}")));
        }
        resp.bytes()
            .map(|b| b.to_vec())
            .map_err(|e| DataError::NetworkUnreachable(e.to_string()))
    }
}

/// Counters for one store's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImageStats {
    pub downloaded: usize,
    pub reused: usize,
    pub failed: usize,
}

/// Deduplicating logo store.
pub struct ImageStore {
    dir: PathBuf,
    source: Box<dyn ImageSource>,
    seen: Mutex<HashSet<String>>,
    downloaded: AtomicUsize,
    reused: AtomicUsize,
    failed: AtomicUsize,
}

impl ImageStore {
    pub fn new(dir: impl Into<PathBuf>, source: Box<dyn ImageSource>) -> Self {
        Self {
            dir: dir.into(),
            source,
            seen: Mutex::new(HashSet::new()),
            downloaded: AtomicUsize::new(0),
            reused: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path a logo for `name` is stored at.
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.png", sanitize_filename(name)))
    }

    /// Make sure a logo for `name` exists locally, downloading it if needed.
    ///
    /// The URL is upscaled to the 64px variant first. A URL already handled by
    /// this store, or a file already on disk, is not downloaded again.
    pub fn fetch(&self, url: &str, name: &str) -> Option<PathBuf> {
        if url.trim().is_empty() {
            return None;
        }
        let url = upscale_image_url(url);
        let key = blake3::hash(url.as_bytes()).to_hex().to_string();
        let path = self.path_for(name);

        let already_seen = self.seen.lock().map(|s| s.contains(&key)).unwrap_or(false);
        if already_seen || path.exists() {
            self.mark_seen(key);
            self.reused.fetch_add(1, Ordering::Relaxed);
            return Some(path);
        }

        match self.download_to(&url, &path) {
            Ok(()) => {
                debug!(name, path = %path.display(), "stored logo");
                self.mark_seen(key);
                self.downloaded.fetch_add(1, Ordering::Relaxed);
                Some(path)
            }
            Err(e) => {
                warn!(name, %url, error = %e, "logo download failed");
                self.failed.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn stats(&self) -> ImageStats {
        ImageStats {
            downloaded: self.downloaded.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    fn mark_seen(&self, key: String) {
        if let Ok(mut seen) = self.seen.lock() {
            seen.insert(key);
        }
    }

    fn download_to(&self, url: &str, path: &Path) -> Result<(), DataError> {
        let bytes = self.source.download(url)?;
        fs::create_dir_all(&self.dir)
            .map_err(|e| DataError::Other(format!("failed to create {}: {e}", self.dir.display())))?;

        let tmp = path.with_extension("png.tmp");
        fs::write(&tmp, &bytes).map_err(|e| DataError::Other(format!("write failed: {e}")))?;
        if let Err(e) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(DataError::Other(format!("rename failed: {e}")));
        }
        Ok(())
    }
}

/// Swap the 32px logo variant for the 64px one.
pub fn upscale_image_url(url: &str) -> String {
    url.replace("/32x32/", "/64x64/")
}

/// Lowercase, with anything outside `[a-zA-Z0-9_-]` replaced by `_`.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}
