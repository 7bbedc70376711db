use async_trait::async_trait;
use rocks_core::booking::NewBooking;
use rocks_core::repository::{to_document, Collection, DocumentStore, StoreError, StoreResult};
use rocks_core::tour::Tour;
use rocks_store::MemoryStore;
use rust_decimal::Decimal;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

pub async fn seed_tour(store: &MemoryStore, id: &str, price: Decimal, max_participants: u32) {
    let tour = Tour::new(id, format!("Tour {}", id), price, max_participants);
    let doc = to_document(Collection::Tours, id, &tour).unwrap();
    store.set(Collection::Tours, id, doc).await.unwrap();
}

pub fn new_booking(tour_id: &str, date: &str) -> NewBooking {
    NewBooking {
        tour_id: tour_id.to_string(),
        selected_date: date.to_string(),
        customer_name: "Ana Silva".to_string(),
        customer_email: "ana@example.com".to_string(),
        participants: 2,
        customer_phone: Some("+351912345678".to_string()),
        special_requests: None,
        payment_method: None,
    }
}

/// Wraps a store and fails every `update` on one collection while armed.
pub struct FlakyStore {
    inner: MemoryStore,
    collection: Collection,
    armed: AtomicBool,
}

impl FlakyStore {
    pub fn new(inner: MemoryStore, collection: Collection) -> Arc<Self> {
        Arc::new(Self {
            inner,
            collection,
            armed: AtomicBool::new(true),
        })
    }

    pub fn disarm(&self) {
        self.armed.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn get(&self, collection: Collection, key: &str) -> StoreResult<Option<Value>> {
        self.inner.get(collection, key).await
    }

    async fn set(&self, collection: Collection, key: &str, data: Value) -> StoreResult<()> {
        self.inner.set(collection, key, data).await
    }

    async fn update(&self, collection: Collection, key: &str, partial: Value) -> StoreResult<()> {
        if collection == self.collection && self.armed.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("injected failure".to_string()));
        }
        self.inner.update(collection, key, partial).await
    }

    async fn insert_if_absent(&self, collection: Collection, key: &str, data: Value) -> StoreResult<bool> {
        self.inner.insert_if_absent(collection, key, data).await
    }

    async fn add_to_set(&self, collection: Collection, key: &str, field: &str, value: &str) -> StoreResult<bool> {
        self.inner.add_to_set(collection, key, field, value).await
    }

    async fn remove_from_set(
        &self,
        collection: Collection,
        key: &str,
        field: &str,
        value: &str,
    ) -> StoreResult<bool> {
        self.inner.remove_from_set(collection, key, field, value).await
    }

    async fn delete(&self, collection: Collection, key: &str) -> StoreResult<bool> {
        self.inner.delete(collection, key).await
    }

    async fn list(&self, collection: Collection) -> StoreResult<Vec<Value>> {
        self.inner.list(collection).await
    }

    async fn find_by_field(&self, collection: Collection, field: &str, value: &Value) -> StoreResult<Vec<Value>> {
        self.inner.find_by_field(collection, field, value).await
    }
}

type Task = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Store call an [`InterleavedStore`] task runs in front of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interleave {
    ListTours,
    AddToSet,
}

/// Wraps a store and runs a one-shot task right before the first matching
/// call, so a job can be interrupted at a chosen point.
pub struct InterleavedStore {
    inner: MemoryStore,
    at: Interleave,
    task: Mutex<Option<Task>>,
}

impl InterleavedStore {
    pub fn new(inner: MemoryStore, at: Interleave, task: impl Future<Output = ()> + Send + 'static) -> Arc<Self> {
        Arc::new(Self {
            inner,
            at,
            task: Mutex::new(Some(Box::pin(task))),
        })
    }

    async fn interleave(&self, call: Interleave) {
        if call != self.at {
            return;
        }
        let task = self.task.lock().await.take();
        if let Some(task) = task {
            task.await;
        }
    }
}

#[async_trait]
impl DocumentStore for InterleavedStore {
    async fn get(&self, collection: Collection, key: &str) -> StoreResult<Option<Value>> {
        self.inner.get(collection, key).await
    }

    async fn set(&self, collection: Collection, key: &str, data: Value) -> StoreResult<()> {
        self.inner.set(collection, key, data).await
    }

    async fn update(&self, collection: Collection, key: &str, partial: Value) -> StoreResult<()> {
        self.inner.update(collection, key, partial).await
    }

    async fn insert_if_absent(&self, collection: Collection, key: &str, data: Value) -> StoreResult<bool> {
        self.inner.insert_if_absent(collection, key, data).await
    }

    async fn add_to_set(&self, collection: Collection, key: &str, field: &str, value: &str) -> StoreResult<bool> {
        self.interleave(Interleave::AddToSet).await;
        self.inner.add_to_set(collection, key, field, value).await
    }

    async fn remove_from_set(
        &self,
        collection: Collection,
        key: &str,
        field: &str,
        value: &str,
    ) -> StoreResult<bool> {
        self.inner.remove_from_set(collection, key, field, value).await
    }

    async fn delete(&self, collection: Collection, key: &str) -> StoreResult<bool> {
        self.inner.delete(collection, key).await
    }

    async fn list(&self, collection: Collection) -> StoreResult<Vec<Value>> {
        if collection == Collection::Tours {
            self.interleave(Interleave::ListTours).await;
        }
        self.inner.list(collection).await
    }

    async fn find_by_field(&self, collection: Collection, field: &str, value: &Value) -> StoreResult<Vec<Value>> {
        self.inner.find_by_field(collection, field, value).await
    }
}
