/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! The asset store: asset name → ready-to-serve bytes.
//!
//! Every producer (stitcher, render worker merge, on-demand image synthesis)
//! writes through [`AssetStore`] and every consumer (HTTP server, dump driver)
//! reads through it. Writes are whole-entry replacements keyed by name, so the
//! last writer wins and a reader never observes a partially written payload.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

/// Immutable payload shared between the store and in-flight responses.
pub type AssetBytes = Arc<[u8]>;

pub type SharedAssetStore = Arc<dyn AssetStore>;

pub trait AssetStore: Send + Sync {
    /// Look up a payload; `None` when the key has never been written.
    fn get(&self, key: &str) -> Option<AssetBytes>;

    /// Insert or replace the payload stored under `key`.
    fn put(&self, key: &str, payload: AssetBytes);

    fn has(&self, key: &str) -> bool;

    /// All keys, sorted.
    fn keys(&self) -> Vec<String>;
}

/// Convenience writers available on every store, including `dyn AssetStore`.
pub trait AssetStoreExt: AssetStore {
    fn put_bytes(&self, key: &str, payload: Vec<u8>) {
        self.put(key, AssetBytes::from(payload));
    }

    fn put_json<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<(), serde_json::Error> {
        let encoded = serde_json::to_vec(value)?;
        self.put_bytes(key, encoded);
        Ok(())
    }
}

impl<S: AssetStore + ?Sized> AssetStoreExt for S {}

/// Copy every entry into the store, replacing existing keys. Returns the
/// number of entries written.
pub fn merge_entries<S, I>(store: &S, entries: I) -> usize
where
    S: AssetStore + ?Sized,
    I: IntoIterator<Item = (String, Vec<u8>)>,
{
    let mut merged = 0;
    for (key, payload) in entries {
        store.put(&key, AssetBytes::from(payload));
        merged += 1;
    }
    merged
}

/// In-process store backed by a hash map behind a reader/writer lock.
#[derive(Default)]
pub struct MemoryAssetStore {
    entries: RwLock<HashMap<String, AssetBytes>>,
}

impl MemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedAssetStore {
        Arc::new(Self::new())
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl AssetStore for MemoryAssetStore {
    fn get(&self, key: &str) -> Option<AssetBytes> {
        self.entries.read().get(key).cloned()
    }

    fn put(&self, key: &str, payload: AssetBytes) {
        if self.entries.write().insert(key.to_string(), payload).is_some() {
            log::debug!("asset_store: replaced '{key}'");
        }
    }

    fn has(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.read().keys().cloned().collect();
        keys.sort();
        keys
    }
}
