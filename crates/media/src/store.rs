//! Object storage for processed attachments.

use std::path::PathBuf;

use {async_trait::async_trait, chrono::Utc, uuid::Uuid};

use crate::error::{Error, Result};

/// Persistent blob storage, keyed by the date-partitioned storage key that
/// ends up inside the canonical media reference.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()>;
    async fn get(&self, key: &str) -> Result<Vec<u8>>;
}

/// Filesystem-backed object store, rooted under the data directory.
///
/// Objects land at `<root>/media/<YYYY>/<MM>/<uuid>-<name>`, mirroring the
/// bucket-prefix layout used with a remote object store.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join("media").join(key)
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, _content_type: &str) -> Result<()> {
        let path = self.path_for(key);
        tokio::task::spawn_blocking(move || -> Result<()> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, &bytes)?;
            Ok(())
        })
        .await
        .map_err(|e| Error::external("storage task", e))??;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path_for(key);
        tokio::task::spawn_blocking(move || -> Result<Vec<u8>> { Ok(std::fs::read(&path)?) })
            .await
            .map_err(|e| Error::external("storage task", e))?
    }
}

/// Build a fresh storage key: date-partitioned, with a random component so
/// identical filenames never collide.
#[must_use]
pub fn object_key(original_name: &str) -> String {
    let now = Utc::now();
    format!(
        "{}/{}-{}",
        now.format("%Y/%m"),
        Uuid::new_v4(),
        sanitize_filename(original_name)
    )
}

/// Keep storage keys shell- and URL-safe: `[A-Za-z0-9._-]`, capped at 100
/// characters.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    cleaned.chars().take(100).collect()
}
