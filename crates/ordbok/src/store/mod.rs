//! Item persistence.
//!
//! The worker only needs a handful of operations from storage, captured by
//! [`ItemStore`]. Two implementations ship with the crate:
//!
//! - [`MemoryStore`] keeps everything in a map; used in tests and for
//!   throwaway deployments.
//! - [`JsonFileStore`] additionally snapshots the map to a JSON file after
//!   every mutation, so pending items survive a restart and are picked up by
//!   the scanner.

use crate::model::Item;
use async_trait::async_trait;

mod json_file;
mod memory;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;


/// Failure reported by an [`ItemStore`].
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store data is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Durable key to [`Item`] storage.
#[async_trait]
pub trait ItemStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Item>, StoreError>;

    /// Inserts or replaces the item stored under `item.key`.
    async fn save(&self, item: &Item) -> Result<(), StoreError>;

    /// All items without entries, oldest first.
    async fn find_pending(&self) -> Result<Vec<Item>, StoreError>;

    /// Returns the existing item for `key`, or creates a pending one.
    ///
    /// The flag is `true` when the item was created by this call.
    async fn create(&self, key: &str) -> Result<(Item, bool), StoreError>;

    /// Every stored item, ordered by key.
    async fn list(&self) -> Result<Vec<Item>, StoreError>;
}

fn oldest_first(mut items: Vec<Item>) -> Vec<Item> {
    items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.key.cmp(&b.key)));
    items
}
