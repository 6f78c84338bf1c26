//! MediaStore - read-only asset lookup.

use std::collections::HashMap;
use std::sync::Mutex;

use uuid::Uuid;

use crate::entities::MediaAsset;

/// Asset registry. The preview core only reads; asset CRUD lives outside.
#[derive(Default)]
pub struct MediaStore {
    assets: Mutex<HashMap<Uuid, MediaAsset>>,
}

impl MediaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, asset: MediaAsset) {
        self.assets
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(asset.id, asset);
    }

    pub fn remove(&self, id: Uuid) -> Option<MediaAsset> {
        self.assets
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id)
    }

    pub fn get(&self, id: Uuid) -> Option<MediaAsset> {
        self.assets
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned()
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.assets
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.assets.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
