use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use super::collaborators::{AssetPath, CollaboratorFailure, ObjectStore};
use super::domain::AssetRef;

/// Stored object kept by `InMemoryObjectStore`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Object store backed by a map; used by the demo and tests.
#[derive(Default, Clone)]
pub struct InMemoryObjectStore {
    objects: Arc<Mutex<HashMap<String, StoredObject>>>,
}

impl InMemoryObjectStore {
    pub fn object(&self, asset: &AssetRef) -> Option<StoredObject> {
        self.objects
            .lock()
            .ok()
            .and_then(|objects| objects.get(&asset.0).cloned())
    }

    pub fn len(&self) -> usize {
        self.objects.lock().map(|objects| objects.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put(
        &self,
        path: &AssetPath,
        bytes: Vec<u8>,
        content_type: &mime::Mime,
    ) -> Result<AssetRef, CollaboratorFailure> {
        let mut objects = self
            .objects
            .lock()
            .map_err(|_| CollaboratorFailure::new("object map lock poisoned"))?;
        if objects.contains_key(path.as_str()) {
            return Err(CollaboratorFailure::new(format!(
                "asset {path} already exists"
            )));
        }
        objects.insert(
            path.as_str().to_string(),
            StoredObject {
                bytes,
                content_type: content_type.essence_str().to_string(),
            },
        );
        Ok(AssetRef(path.as_str().to_string()))
    }

    async fn url(&self, asset: &AssetRef) -> Result<String, CollaboratorFailure> {
        Ok(format!("memory://{}", asset.0))
    }
}

/// Object store writing under a root directory and serving from a public base URL.
#[derive(Debug, Clone)]
pub struct FilesystemObjectStore {
    root: PathBuf,
    public_base_url: String,
}

impl FilesystemObjectStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ObjectStore for FilesystemObjectStore {
    async fn put(
        &self,
        path: &AssetPath,
        bytes: Vec<u8>,
        _content_type: &mime::Mime,
    ) -> Result<AssetRef, CollaboratorFailure> {
        let target = self.root.join(path.as_str());
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| CollaboratorFailure::new(format!("create {parent:?}: {err}")))?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
            .await
            .map_err(|err| match err.kind() {
                ErrorKind::AlreadyExists => {
                    CollaboratorFailure::new(format!("asset {path} already exists"))
                }
                _ => CollaboratorFailure::new(format!("open {target:?}: {err}")),
            })?;
        file.write_all(&bytes)
            .await
            .map_err(|err| CollaboratorFailure::new(format!("write {target:?}: {err}")))?;
        file.flush()
            .await
            .map_err(|err| CollaboratorFailure::new(format!("flush {target:?}: {err}")))?;

        Ok(AssetRef(path.as_str().to_string()))
    }

    async fn url(&self, asset: &AssetRef) -> Result<String, CollaboratorFailure> {
        Ok(format!("{}/{}", self.public_base_url, asset.0))
    }
}
