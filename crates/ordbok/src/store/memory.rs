use super::{ItemStore, StoreError, oldest_first};
use crate::model::Item;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// In-memory [`ItemStore`]. Contents are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: RwLock<BTreeMap<String, Item>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the store with `items`, replacing any existing keys.
    pub fn with_items(items: impl IntoIterator<Item = Item>) -> Self {
        Self {
            items: RwLock::new(items.into_iter().map(|i| (i.key.clone(), i)).collect()),
        }
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }
}

#[async_trait]
impl ItemStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Item>, StoreError> {
        Ok(self.items.read().get(key).cloned())
    }

    async fn save(&self, item: &Item) -> Result<(), StoreError> {
        self.items.write().insert(item.key.clone(), item.clone());
        Ok(())
    }

    async fn find_pending(&self) -> Result<Vec<Item>, StoreError> {
        let pending = self
            .items
            .read()
            .values()
            .filter(|item| item.is_pending())
            .cloned()
            .collect();
        Ok(oldest_first(pending))
    }

    async fn create(&self, key: &str) -> Result<(Item, bool), StoreError> {
        let mut items = self.items.write();
        if let Some(existing) = items.get(key) {
            return Ok((existing.clone(), false));
        }
        let item = Item::new(key);
        items.insert(key.to_owned(), item.clone());
        Ok((item, true))
    }

    async fn list(&self) -> Result<Vec<Item>, StoreError> {
        Ok(self.items.read().values().cloned().collect())
    }
}
