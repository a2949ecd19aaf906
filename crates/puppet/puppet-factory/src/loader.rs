//! Resource loading seam.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::LoadError;

/// Fetches the bytes behind a resolved URL.
#[async_trait]
pub trait ResourceLoader: Send + Sync {
    async fn load(&self, url: &str) -> Result<Vec<u8>, LoadError>;
}

/// Reads from the filesystem, relative URLs joined onto `root`.
#[derive(Clone, Debug, Default)]
pub struct FsLoader {
    root: Option<PathBuf>,
}

impl FsLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    /// Paths are used as given.
    pub fn unrooted() -> Self {
        Self { root: None }
    }

    fn path_for(&self, url: &str) -> PathBuf {
        let url = url.strip_prefix("file://").unwrap_or(url);
        match &self.root {
            Some(root) if !url.starts_with('/') => root.join(url),
            _ => PathBuf::from(url),
        }
    }
}

#[async_trait]
impl ResourceLoader for FsLoader {
    async fn load(&self, url: &str) -> Result<Vec<u8>, LoadError> {
        let path = self.path_for(url);
        tokio::fs::read(&path)
            .await
            .map_err(|e| LoadError::new(url, format!("{}: {e}", path.display())))
    }
}

/// In-memory files keyed by URL. Records every request in order.
#[derive(Debug, Default)]
pub struct MemoryLoader {
    files: HashMap<String, Vec<u8>>,
    requests: Mutex<Vec<String>>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, url: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.files.insert(url.into(), bytes.into());
    }

    pub fn with_file(mut self, url: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(url, bytes);
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }
}

impl FromIterator<(String, Vec<u8>)> for MemoryLoader {
    fn from_iter<T: IntoIterator<Item = (String, Vec<u8>)>>(iter: T) -> Self {
        Self {
            files: iter.into_iter().collect(),
            requests: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ResourceLoader for MemoryLoader {
    async fn load(&self, url: &str) -> Result<Vec<u8>, LoadError> {
        self.requests.lock().push(url.to_string());
        self.files
            .get(url)
            .cloned()
            .ok_or_else(|| LoadError::new(url, "not found"))
    }
}
