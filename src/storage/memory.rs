//! In-memory store, used by tests and throwaway instances

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::RwLock;

use super::OriginalStore;
use crate::errors::StorageResult;

#[derive(Debug, Default)]
pub struct MemoryStore {
    files: RwLock<HashMap<String, Bytes>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.files.read().map(|files| files.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl OriginalStore for MemoryStore {
    async fn reserve(&self, id: &str) -> StorageResult<bool> {
        let mut files = self.files.write().unwrap_or_else(|e| e.into_inner());
        if files.contains_key(id) {
            return Ok(false);
        }
        files.insert(id.to_string(), Bytes::new());
        Ok(true)
    }

    async fn write(&self, id: &str, contents: &[u8]) -> StorageResult<()> {
        self.files
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.to_string(), Bytes::copy_from_slice(contents));
        Ok(())
    }

    async fn read(&self, id: &str) -> StorageResult<Option<Bytes>> {
        Ok(self
            .files
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned())
    }

    async fn exists(&self, id: &str) -> StorageResult<bool> {
        Ok(self
            .files
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(id))
    }

    async fn discard(&self, id: &str) -> StorageResult<()> {
        self.files
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id);
        Ok(())
    }
}
