//! Disk-backed blob cache sitting in front of the Shadertoy fetcher.
//!
//! Layout under the cache root:
//!
//! - `shaders/<id>.json` holds raw definition payloads. These go stale: once
//!   an entry older than the configured threshold has been served, the caller
//!   retires it with [`BlobCache::retire_if_stale`] so the next load refetches.
//!   The stale copy is still used for the current load, so a slow network never
//!   delays the shader that is about to be shown.
//! - `images/<mirrored media path>` holds channel textures. Media paths are
//!   content-addressed upstream, so these never expire.
//!
//! Every write goes through a temporary file in the destination directory and
//! an atomic rename, so several render units (or processes) sharing the cache
//! never observe a half-written entry.
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use reqwest::Url;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::ContentId;

const DEFINITION_DIR: &str = "shaders";
const IMAGE_DIR: &str = "images";

/// Network side of the cache: produce the full body for a key or fail.
pub trait Fetch {
    fn fetch(&self, key: &CacheKey) -> anyhow::Result<Vec<u8>>;
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{key} is unavailable: {reason}")]
    Unavailable { key: String, reason: String },
    #[error("'{0}' cannot be mapped to a cache location")]
    InvalidKey(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Definition(ContentId),
    /// Normalized media path relative to the remote host, e.g. `media/a/x.png`.
    Image(String),
}

impl CacheKey {
    pub fn definition(id: &ContentId) -> Self {
        Self::Definition(id.clone())
    }

    /// Builds an image key from a source reference as it appears in a
    /// definition (`/media/a/x.png`, `https://host/media/a/x.png`, ...).
    pub fn image(src: &str) -> Result<Self, FetchError> {
        normalize_media_path(src)
            .map(Self::Image)
            .ok_or_else(|| FetchError::InvalidKey(src.to_string()))
    }

    pub fn is_definition(&self) -> bool {
        matches!(self, Self::Definition(_))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Definition(id) => write!(f, "shader {id}"),
            Self::Image(path) => write!(f, "image {path}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobOrigin {
    Disk { age: Duration },
    Network,
}

#[derive(Debug, Clone)]
pub struct CachedBlob {
    pub key: CacheKey,
    pub path: PathBuf,
    pub bytes: Vec<u8>,
    pub origin: BlobOrigin,
}

pub struct BlobCache {
    root: PathBuf,
    fetcher: Option<Box<dyn Fetch + Send + Sync>>,
    stale_after: Duration,
}

impl fmt::Debug for BlobCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobCache")
            .field("root", &self.root)
            .field("remote", &self.fetcher.is_some())
            .field("stale_after", &self.stale_after)
            .finish()
    }
}

impl BlobCache {
    pub fn new(
        root: impl Into<PathBuf>,
        fetcher: Option<Box<dyn Fetch + Send + Sync>>,
        stale_after: Duration,
    ) -> Self {
        Self {
            root: root.into(),
            fetcher,
            stale_after,
        }
    }

    /// A cache that only serves what is already on disk.
    pub fn cache_only(root: impl Into<PathBuf>, stale_after: Duration) -> Self {
        Self::new(root, None, stale_after)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn has_remote(&self) -> bool {
        self.fetcher.is_some()
    }

    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        match key {
            CacheKey::Definition(id) => self
                .root
                .join(DEFINITION_DIR)
                .join(format!("{}.json", id.as_str())),
            CacheKey::Image(path) => {
                let mut full = self.root.join(IMAGE_DIR);
                full.extend(path.split('/'));
                full
            }
        }
    }

    /// Returns the bytes for `key`, preferring the on-disk copy.
    ///
    /// On a miss the body is fetched in full and persisted before returning.
    /// A failed persist is logged but does not fail the lookup.
    pub fn get(&self, key: &CacheKey) -> Result<CachedBlob, FetchError> {
        let path = self.path_for(key);
        match fs::read(&path) {
            Ok(bytes) => {
                let age = file_age(&path);
                debug!(%key, path = %path.display(), age_secs = age.as_secs(), "cache hit");
                return Ok(CachedBlob {
                    key: key.clone(),
                    path,
                    bytes,
                    origin: BlobOrigin::Disk { age },
                });
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                warn!(
                    %key,
                    path = %path.display(),
                    error = %err,
                    "unreadable cache entry; refetching"
                );
            }
        }

        let fetcher = self.fetcher.as_deref().ok_or_else(|| FetchError::Unavailable {
            key: key.to_string(),
            reason: "not cached and remote fetch is disabled".to_string(),
        })?;
        let bytes = fetcher.fetch(key).map_err(|err| FetchError::Unavailable {
            key: key.to_string(),
            reason: format!("{err:#}"),
        })?;

        if let Err(err) = persist_atomically(&path, &bytes) {
            warn!(%key, path = %path.display(), error = %err, "failed to persist fetched blob");
        } else {
            debug!(%key, path = %path.display(), bytes = bytes.len(), "cached fetched blob");
        }

        Ok(CachedBlob {
            key: key.clone(),
            path,
            bytes,
            origin: BlobOrigin::Network,
        })
    }

    /// Deletes a definition entry that was served from disk and is older than
    /// the staleness threshold. Image entries are never retired, and nothing
    /// is retired without a remote to refetch it from.
    pub fn retire_if_stale(&self, blob: &CachedBlob) -> bool {
        let BlobOrigin::Disk { age } = blob.origin else {
            return false;
        };
        if !blob.key.is_definition() || age <= self.stale_after {
            return false;
        }
        if self.fetcher.is_none() {
            debug!(
                key = %blob.key,
                age_secs = age.as_secs(),
                "keeping stale shader; remote fetch is disabled"
            );
            return false;
        }
        match fs::remove_file(&blob.path) {
            Ok(()) => {
                info!(key = %blob.key, age_secs = age.as_secs(), "removed stale cached shader");
                true
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => false,
            Err(err) => {
                warn!(key = %blob.key, error = %err, "failed to remove stale cache entry");
                false
            }
        }
    }

    /// Removes the entry for `key`, returning whether a file was deleted.
    pub fn evict(&self, key: &CacheKey) -> io::Result<bool> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err),
        }
    }
}

fn file_age(path: &Path) -> Duration {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .unwrap_or(Duration::ZERO)
}

fn persist_atomically(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = path.parent().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "cache path has no parent")
    })?;
    fs::create_dir_all(parent)?;
    let mut staged = NamedTempFile::new_in(parent)?;
    staged.write_all(bytes)?;
    staged.as_file().sync_all()?;
    staged.persist(path).map_err(|err| err.error)?;
    Ok(())
}

fn normalize_media_path(src: &str) -> Option<String> {
    let trimmed = src.trim();
    let trimmed = trimmed.split(&['?', '#'][..]).next().unwrap_or(trimmed);
    let path_owned = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        Url::parse(trimmed).ok()?.path().to_string()
    } else if trimmed.starts_with("//") {
        Url::parse(&format!("https:{trimmed}")).ok()?.path().to_string()
    } else {
        trimmed.to_string()
    };

    let mut segments = Vec::new();
    for segment in path_owned.split('/') {
        match segment {
            "" => continue,
            "." | ".." => return None,
            other if other.contains('\\') || other.contains(':') => return None,
            other => segments.push(other),
        }
    }
    if segments.is_empty() {
        return None;
    }
    Some(segments.join("/"))
}
