//! Persistence of the single JSON document behind the mock API.
//!
//! The whole document lives in one key-value slot. Every read parses the
//! slot in full and every write replaces it in full; `Store::modify` wraps
//! that cycle in a mutex so concurrent requests cannot lose updates.

mod backend;
mod document;
pub(crate) mod lenient;

pub use backend::{FileKv, KvBackend, MemoryKv};
pub use document::{
    Amount, Catalog, Document, Payment, Question, Subscription, Tariff, UserId,
};

use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::{StorageBackend, StorageConfig};
use crate::error::{Result, ServiceError};

// A slot that holds valid JSON in an unexpected shape is never replaced by
// the default document.
enum SlotState {
    Writable,
    ReadOnly(String),
}

/// Outcome of a `Store::modify` closure.
pub enum Change<R> {
    /// Persist the mutated document and return the value.
    Commit(R),
    /// Return the value and leave the slot untouched.
    Discard(R),
}

pub struct Store {
    backend: Arc<dyn KvBackend>,
    slot: String,
    catalog: Catalog,
    lock: Mutex<()>,
}

impl Store {
    pub fn new(backend: Arc<dyn KvBackend>, slot: impl Into<String>, catalog: Catalog) -> Self {
        Self {
            backend,
            slot: slot.into(),
            catalog,
            lock: Mutex::new(()),
        }
    }

    pub fn in_memory(catalog: Catalog) -> Self {
        Self::new(Arc::new(MemoryKv::new()), "catalyst_club_data", catalog)
    }

    pub fn from_config(config: &StorageConfig, catalog: Catalog) -> Self {
        let backend: Arc<dyn KvBackend> = match config.backend {
            StorageBackend::File => Arc::new(FileKv::new(&config.data_dir)),
            StorageBackend::Memory => Arc::new(MemoryKv::new()),
        };
        tracing::info!(
            "Store slot {:?} on {:?} backend",
            config.slot,
            config.backend
        );
        Self::new(backend, config.slot.clone(), catalog)
    }

    pub fn default_document(&self) -> Document {
        Document::with_catalog(self.catalog.clone())
    }

    /// Returns the persisted document. A missing slot is initialised with the
    /// default document; an unreadable or corrupt slot yields the default
    /// without failing the caller. A slot that is valid JSON but not a
    /// document is served as defaults and `modify` refuses to replace it.
    pub async fn load(&self) -> Document {
        let _guard = self.lock.lock().await;
        self.load_locked().await.0
    }

    async fn load_locked(&self) -> (Document, SlotState) {
        let raw = match self.backend.get(&self.slot).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                let doc = self.default_document();
                if let Err(e) = self.save(&doc).await {
                    tracing::warn!("Failed to persist initial document: {}", e);
                }
                return (doc, SlotState::Writable);
            }
            Err(e) => {
                tracing::warn!("Storage slot {:?} unavailable, using defaults: {}", self.slot, e);
                return (self.default_document(), SlotState::ReadOnly(e.to_string()));
            }
        };

        let value: serde_json::Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Storage slot {:?} is corrupt, using defaults: {}", self.slot, e);
                return (self.default_document(), SlotState::Writable);
            }
        };

        match self.parse(value) {
            Ok(doc) => (doc, SlotState::Writable),
            Err(e) => {
                tracing::warn!(
                    "Storage slot {:?} does not match the document layout, serving defaults read-only: {}",
                    self.slot,
                    e
                );
                (self.default_document(), SlotState::ReadOnly(e.to_string()))
            }
        }
    }

    pub async fn save(&self, doc: &Document) -> Result<()> {
        let raw = serde_json::to_string(doc)?;
        self.backend.set(&self.slot, raw).await
    }

    /// Read-modify-write under the store lock.
    pub async fn modify<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Document) -> Change<R>,
    {
        let _guard = self.lock.lock().await;
        let (mut doc, state) = self.load_locked().await;
        match f(&mut doc) {
            Change::Commit(out) => {
                if let SlotState::ReadOnly(reason) = state {
                    return Err(ServiceError::Storage(format!(
                        "refusing to overwrite slot {:?}: {}",
                        self.slot, reason
                    )));
                }
                self.save(&doc).await?;
                Ok(out)
            }
            Change::Discard(out) => Ok(out),
        }
    }

    // A stored document whose `settings` is missing or unusable gets the
    // configured catalog, not the serde default.
    fn parse(&self, mut value: serde_json::Value) -> serde_json::Result<Document> {
        if let Some(obj) = value.as_object_mut() {
            let usable = obj
                .get("settings")
                .is_some_and(|s| serde_json::from_value::<Catalog>(s.clone()).is_ok());
            if !usable {
                obj.insert("settings".into(), serde_json::to_value(&self.catalog)?);
            }
        }
        serde_json::from_value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn first_load_persists_default_document() {
        let kv = Arc::new(MemoryKv::new());
        let store = Store::new(kv.clone(), "slot", Catalog::default());
        let doc = store.load().await;
        assert!(doc.questions.is_empty());
        assert_eq!(doc.settings.tariffs.len(), 3);

        let raw = kv.get("slot").await.unwrap().unwrap();
        let v: serde_json::Value = serde_json::from_str(&raw).unwrap();
        for key in ["subscriptions", "payments", "questions", "users", "settings"] {
            assert!(v.get(key).is_some(), "missing {key}");
        }
    }

    #[tokio::test]
    async fn corrupt_slot_falls_back_to_defaults() {
        let kv = Arc::new(MemoryKv::new());
        kv.set("slot", "{not json".into()).await.unwrap();
        let store = Store::new(kv.clone(), "slot", Catalog::default());
        assert_eq!(store.load().await, Document::default());
        // The corrupt value is left alone until the next write.
        assert_eq!(kv.get("slot").await.unwrap().as_deref(), Some("{not json"));
    }

    #[tokio::test]
    async fn partial_document_is_merged_with_defaults() {
        let kv = Arc::new(MemoryKv::new());
        kv.set("slot", json!({ "payments": [] }).to_string())
            .await
            .unwrap();
        let catalog = Catalog {
            tariffs: vec![Tariff {
                key: "3m".into(),
                label: "3m".into(),
                amount: 4000,
            }],
        };
        let store = Store::new(kv, "slot", catalog.clone());
        let doc = store.load().await;
        assert!(doc.subscriptions.is_empty());
        assert_eq!(doc.settings, catalog);
    }

    #[tokio::test]
    async fn save_then_load_is_identity() {
        let store = Store::in_memory(Catalog::default());
        let mut doc = store.load().await;
        doc.users.insert("1".into(), json!({ "id": 1, "name": "a" }));
        store.save(&doc).await.unwrap();
        let loaded = store.load().await;
        assert_eq!(loaded, doc);
        store.save(&loaded).await.unwrap();
        assert_eq!(store.load().await, loaded);
    }

    #[tokio::test]
    async fn discarded_change_is_not_written() {
        let store = Store::in_memory(Catalog::default());
        store
            .modify(|doc| {
                doc.users.insert("x".into(), json!({}));
                Change::Discard(())
            })
            .await
            .unwrap();
        assert!(store.load().await.users.is_empty());
    }

    #[tokio::test]
    async fn concurrent_modifications_are_not_lost() {
        let store = Arc::new(Store::in_memory(Catalog::default()));
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .modify(|doc| {
                        doc.users.insert(i.to_string(), json!({ "id": i }));
                        Change::Commit(())
                    })
                    .await
                    .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(store.load().await.users.len(), 16);
    }

    #[tokio::test]
    async fn file_store_survives_reopen() {
        let dir = tempdir().unwrap();
        let config = StorageConfig {
            backend: StorageBackend::File,
            data_dir: dir.path().to_string_lossy().into_owned(),
            slot: "club".into(),
        };
        let store = Store::from_config(&config, Catalog::default());
        store
            .modify(|doc| {
                doc.users.insert("9".into(), json!({ "id": 9 }));
                Change::Commit(())
            })
            .await
            .unwrap();

        let reopened = Store::from_config(&config, Catalog::default());
        assert!(reopened.load().await.users.contains_key("9"));
    }

    #[tokio::test]
    async fn records_with_unexpected_field_types_survive_a_write() {
        let kv = Arc::new(MemoryKv::new());
        let seeded = json!({
            "payments": [
                { "id": "p1", "user_id": null, "amount": 1500.5, "note": "kept" }
            ],
            "questions": [],
        });
        kv.set("slot", seeded.to_string()).await.unwrap();
        let store = Store::new(kv.clone(), "slot", Catalog::default());
        store
            .modify(|doc| {
                doc.users.insert("1".into(), json!({ "id": 1 }));
                Change::Commit(())
            })
            .await
            .unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&kv.get("slot").await.unwrap().unwrap()).unwrap();
        assert_eq!(raw["payments"][0]["id"], json!("p1"));
        assert!(raw["payments"][0]["user_id"].is_null());
        assert_eq!(raw["payments"][0]["amount"], json!(1500.5));
        assert_eq!(raw["payments"][0]["note"], json!("kept"));
    }

    #[tokio::test]
    async fn misshapen_slot_is_never_overwritten() {
        let kv = Arc::new(MemoryKv::new());
        let seeded = json!({ "payments": [1, 2], "users": { "1": {} } }).to_string();
        kv.set("slot", seeded.clone()).await.unwrap();
        let store = Store::new(kv.clone(), "slot", Catalog::default());

        assert_eq!(store.load().await, Document::default());
        let err = store
            .modify(|doc| {
                doc.users.insert("2".into(), json!({}));
                Change::Commit(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Storage(_)));
        assert_eq!(kv.get("slot").await.unwrap(), Some(seeded));
    }

    #[tokio::test]
    async fn unusable_settings_fall_back_to_catalog() {
        let kv = Arc::new(MemoryKv::new());
        kv.set("slot", json!({ "settings": "oops", "users": { "1": {} } }).to_string())
            .await
            .unwrap();
        let store = Store::new(kv, "slot", Catalog::default());
        let doc = store.load().await;
        assert_eq!(doc.settings, Catalog::default());
        assert!(doc.users.contains_key("1"));
    }
}
