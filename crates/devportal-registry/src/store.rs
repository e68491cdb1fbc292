//! The seam to the external attribute store.
//!
//! In production the attribute list of every principal lives in the API
//! management platform. This module contains the [`AttributeStore`] trait
//! abstracting over it, an in-memory implementation for tests and embedding,
//! and a JSON file implementation used by the command line tool.
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use snafu::{ResultExt, Snafu};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, instrument};

use crate::attribute::AttributeList;

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum StoreError {
    #[snafu(display("failed to read attribute store file {path:?}"))]
    ReadFile {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to write attribute store file {path:?}"))]
    WriteFile {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("attribute store file {path:?} contains malformed data"))]
    DeserializeAttributes {
        source: serde_json::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to serialize attributes"))]
    SerializeAttributes { source: serde_json::Error },

    #[snafu(display("attribute store is unavailable: {message}"))]
    Unavailable { message: String },
}

/// Access to the ordered attribute list of principals.
///
/// Writes always replace the full list of a principal. There is no
/// conditional update, so concurrent read-modify-write cycles can overwrite
/// each other.
//
// We still need to use the async-trait crate, as async functions in traits
// don't support dynamic dispatch (`Arc<dyn AttributeStore>`).
#[async_trait]
pub trait AttributeStore: Send + Sync {
    /// Returns the attribute list of the principal. Unknown principals have an
    /// empty list.
    async fn get(&self, principal: &str) -> Result<AttributeList>;

    /// Replaces the attribute list of the principal and returns the stored
    /// list.
    async fn put(&self, principal: &str, attributes: AttributeList) -> Result<AttributeList>;
}

#[async_trait]
impl<S: AttributeStore + ?Sized> AttributeStore for std::sync::Arc<S> {
    async fn get(&self, principal: &str) -> Result<AttributeList> {
        (**self).get(principal).await
    }

    async fn put(&self, principal: &str, attributes: AttributeList) -> Result<AttributeList> {
        (**self).put(principal, attributes).await
    }
}

#[derive(Debug, Default)]
pub struct MemoryAttributeStore {
    principals: RwLock<BTreeMap<String, AttributeList>>,
}

impl MemoryAttributeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store with a single principal.
    pub fn with_principal(principal: impl Into<String>, attributes: AttributeList) -> Self {
        Self {
            principals: RwLock::new(BTreeMap::from([(principal.into(), attributes)])),
        }
    }
}

#[async_trait]
impl AttributeStore for MemoryAttributeStore {
    async fn get(&self, principal: &str) -> Result<AttributeList> {
        Ok(self
            .principals
            .read()
            .await
            .get(principal)
            .cloned()
            .unwrap_or_default())
    }

    async fn put(&self, principal: &str, attributes: AttributeList) -> Result<AttributeList> {
        self.principals
            .write()
            .await
            .insert(principal.to_owned(), attributes.clone());

        Ok(attributes)
    }
}

/// Stores the attribute lists of all principals in a single JSON file,
/// keyed by principal:
///
/// ```json
/// { "jane@acme.example": { "attribute": [ { "name": "...", "value": "..." } ] } }
/// ```
///
/// A missing file is an empty store, as long as its directory exists. A
/// missing directory means the store isn't mounted and is reported as
/// [`StoreError::Unavailable`]. Writes go to a temporary sibling file which
/// then replaces the store file.
#[derive(Debug)]
pub struct FileAttributeStore {
    path: PathBuf,

    // Serializes read-modify-write cycles of the file within this process.
    lock: Mutex<()>,
}

impl FileAttributeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<BTreeMap<String, AttributeList>> {
        let contents = match tokio::fs::read(&self.path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                self.ensure_directory().await?;
                return Ok(BTreeMap::new());
            }
            Err(err) => {
                return Err(err).context(ReadFileSnafu { path: &self.path });
            }
        };

        serde_json::from_slice(&contents).context(DeserializeAttributesSnafu { path: &self.path })
    }

    async fn ensure_directory(&self) -> Result<()> {
        let Some(directory) = self
            .path
            .parent()
            .filter(|directory| !directory.as_os_str().is_empty())
        else {
            return Ok(());
        };

        match tokio::fs::metadata(directory).await {
            Ok(metadata) if metadata.is_dir() => Ok(()),
            _ => UnavailableSnafu {
                message: format!("directory {} does not exist", directory.display()),
            }
            .fail(),
        }
    }

    async fn write_all(&self, principals: &BTreeMap<String, AttributeList>) -> Result<()> {
        let contents = serde_json::to_vec_pretty(principals).context(SerializeAttributesSnafu)?;

        let mut temporary = self.path.clone().into_os_string();
        temporary.push(".tmp");
        let temporary = PathBuf::from(temporary);

        tokio::fs::write(&temporary, contents)
            .await
            .context(WriteFileSnafu { path: &temporary })?;
        tokio::fs::rename(&temporary, &self.path)
            .await
            .context(WriteFileSnafu { path: &self.path })
    }
}

#[async_trait]
impl AttributeStore for FileAttributeStore {
    #[instrument(skip(self), fields(path = ?self.path))]
    async fn get(&self, principal: &str) -> Result<AttributeList> {
        let _guard = self.lock.lock().await;
        let mut principals = self.read_all().await?;

        Ok(principals.remove(principal).unwrap_or_default())
    }

    #[instrument(skip(self, attributes), fields(path = ?self.path, attributes = attributes.len()))]
    async fn put(&self, principal: &str, attributes: AttributeList) -> Result<AttributeList> {
        let _guard = self.lock.lock().await;
        let mut principals = self.read_all().await?;

        principals.insert(principal.to_owned(), attributes.clone());
        self.write_all(&principals).await?;
        debug!("stored attribute list");

        Ok(attributes)
    }
}
