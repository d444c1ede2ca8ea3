//! On-disk cache of raw HTTP response bodies, keyed by request URL.
//!
//! Sits underneath the weather record cache: if the record cache is deleted or
//! a record could not be stored, repeating an identical archive request is
//! still answered locally. Entries never expire.

use crate::weather_data::error::WeatherDataError;
use log::{debug, warn};
use sha2::{Digest, Sha256};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::{fs, task};

pub const HTTP_CACHE_DIR_NAME: &str = "http_cache";

#[derive(Debug, Clone)]
pub struct HttpCache {
    dir: PathBuf,
}

impl HttpCache {
    pub async fn new(cache_dir: &Path) -> Result<Self, WeatherDataError> {
        let dir = cache_dir.join(HTTP_CACHE_DIR_NAME);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| WeatherDataError::CacheDirCreation(dir.clone(), e))?;
        Ok(Self { dir })
    }

    fn entry_path(&self, url: &str) -> PathBuf {
        let digest = Sha256::digest(url.as_bytes());
        self.dir.join(format!("{}.json", hex::encode(digest)))
    }

    /// Cached body for `url`. Unreadable entries count as absent.
    pub async fn get(&self, url: &str) -> Option<Vec<u8>> {
        let path = self.entry_path(url);
        match fs::read(&path).await {
            Ok(body) => {
                debug!("HTTP cache hit for {}", url);
                Some(body)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!("Ignoring unreadable HTTP cache entry {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Stores `body` for `url`, replacing any previous entry atomically.
    pub async fn put(&self, url: &str, body: Vec<u8>) -> Result<(), WeatherDataError> {
        let path = self.entry_path(url);
        let dir = self.dir.clone();
        task::spawn_blocking(move || {
            let write = || -> io::Result<()> {
                let mut temp_file = NamedTempFile::new_in(&dir)?;
                temp_file.write_all(&body)?;
                temp_file.flush()?;
                temp_file.persist(&path).map_err(|e| e.error)?;
                Ok(())
            };
            write().map_err(|e| WeatherDataError::HttpCacheWrite(path.clone(), e))
        })
        .await?
    }
}
