//! JSON file persistence.
//!
//! The business configuration and the Google token each live in a single JSON
//! document inside the shared data directory. Documents are read and written
//! wholesale; the last writer wins.

use serde::{Serialize, de::DeserializeOwned};
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::business::BusinessConfig;
use crate::google::token::StoredToken;

pub const BUSINESS_CONFIG_FILE: &str = "business_config.json";
pub const TOKEN_FILE: &str = "token.json";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A typed handle on one JSON document.
#[derive(Debug)]
pub struct JsonFile<T> {
    path: PathBuf,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for JsonFile<T> {
    fn clone(&self) -> Self {
        Self::new(self.path.clone())
    }
}

pub type BusinessStore = JsonFile<BusinessConfig>;
pub type TokenStore = JsonFile<StoredToken>;

impl BusinessStore {
    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(BUSINESS_CONFIG_FILE))
    }
}

impl TokenStore {
    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(TOKEN_FILE))
    }
}

impl<T> JsonFile<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl<T: Serialize + DeserializeOwned> JsonFile<T> {
    /// Reads the document, returning `None` when it has never been written.
    pub async fn load(&self) -> Result<Option<T>, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| StoreError::Json {
                path: self.path.clone(),
                source,
            })
    }

    /// Replaces the document.
    ///
    /// The new content is written beside the target and renamed over it, so
    /// readers never observe a partially written file.
    pub async fn save(&self, value: &T) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| self.io_error(e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.io_error(e))?;

        debug!(path = %self.path.display(), "Saved JSON document");
        Ok(())
    }
}
