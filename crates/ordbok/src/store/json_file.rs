use super::{ItemStore, StoreError, oldest_first};
use crate::model::Item;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// [`ItemStore`] backed by a single JSON file.
///
/// The whole map lives in memory; every mutation rewrites the file by
/// writing a sibling temp file and renaming it over the original, so a crash
/// mid-write leaves the previous snapshot intact. Writes are serialized by the
/// store lock.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    items: Mutex<BTreeMap<String, Item>>,
}

impl JsonFileStore {
    /// Opens `path`, loading existing items. A missing file is an empty store.
    ///
    /// # Errors
    ///
    /// Fails if the file exists but cannot be read or parsed. The file is
    /// never overwritten in that case.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let items = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let items: Vec<Item> = serde_json::from_slice(&bytes)?;
                items.into_iter().map(|i| (i.key.clone(), i)).collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        tracing::info!(path = %path.display(), items = items.len(), "Opened item store");
        Ok(Self {
            path,
            items: Mutex::new(items),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, items: &BTreeMap<String, Item>) -> Result<(), StoreError> {
        let snapshot: Vec<&Item> = items.values().collect();
        let bytes = serde_json::to_vec_pretty(&snapshot)?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl ItemStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<Item>, StoreError> {
        Ok(self.items.lock().await.get(key).cloned())
    }

    async fn save(&self, item: &Item) -> Result<(), StoreError> {
        let mut items = self.items.lock().await;
        let previous = items.insert(item.key.clone(), item.clone());
        if let Err(e) = self.persist(&items).await {
            // Keep memory consistent with what is on disk.
            match previous {
                Some(previous) => items.insert(item.key.clone(), previous),
                None => items.remove(&item.key),
            };
            return Err(e);
        }
        Ok(())
    }

    async fn find_pending(&self) -> Result<Vec<Item>, StoreError> {
        let pending = self
            .items
            .lock()
            .await
            .values()
            .filter(|item| item.is_pending())
            .cloned()
            .collect();
        Ok(oldest_first(pending))
    }

    async fn create(&self, key: &str) -> Result<(Item, bool), StoreError> {
        let mut items = self.items.lock().await;
        if let Some(existing) = items.get(key) {
            return Ok((existing.clone(), false));
        }
        let item = Item::new(key);
        items.insert(key.to_owned(), item.clone());
        if let Err(e) = self.persist(&items).await {
            items.remove(key);
            return Err(e);
        }
        Ok((item, true))
    }

    async fn list(&self) -> Result<Vec<Item>, StoreError> {
        Ok(self.items.lock().await.values().cloned().collect())
    }
}
