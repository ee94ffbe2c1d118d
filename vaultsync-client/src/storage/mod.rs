//! Persistent key/value storage.
//!
//! Values are JSON documents. Every call goes to the backing store; nothing
//! here caches reads.

mod file;
mod memory;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

pub use file::{JsonFileStorage, StorageKey};
pub use memory::MemoryStorage;

#[async_trait]
pub trait Storage: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    async fn save(&self, key: &str, value: Value) -> Result<()>;

    async fn remove(&self, key: &str) -> Result<()>;
}
