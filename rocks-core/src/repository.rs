use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Collections the booking backend keeps documents in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Tours,
    Bookings,
    PaymentTransactions,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Tours => "tours",
            Collection::Bookings => "bookings",
            Collection::PaymentTransactions => "payment_transactions",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{collection}/{key} not found")]
    NotFound { collection: Collection, key: String },
    #[error("{collection}/{key} is malformed: {reason}")]
    Malformed {
        collection: Collection,
        key: String,
        reason: String,
    },
    #[error("Store backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Document Store Adapter.
///
/// Every method is a single atomic operation on one document. There are no
/// multi-document transactions; callers compose sagas out of these.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: Collection, key: &str) -> StoreResult<Option<Value>>;

    /// Full overwrite.
    async fn set(&self, collection: Collection, key: &str, data: Value) -> StoreResult<()>;

    /// Top-level merge of `partial` into an existing document.
    async fn update(&self, collection: Collection, key: &str, partial: Value) -> StoreResult<()>;

    /// Writes `data` only if `key` is absent. Returns `false` when it already exists.
    async fn insert_if_absent(&self, collection: Collection, key: &str, data: Value) -> StoreResult<bool>;

    /// Array-union of `value` into `field`. Returns `true` if the value was added.
    async fn add_to_set(&self, collection: Collection, key: &str, field: &str, value: &str) -> StoreResult<bool>;

    /// Array-remove of `value` from `field`. Returns `true` if the value was present.
    async fn remove_from_set(
        &self,
        collection: Collection,
        key: &str,
        field: &str,
        value: &str,
    ) -> StoreResult<bool>;

    async fn delete(&self, collection: Collection, key: &str) -> StoreResult<bool>;

    async fn list(&self, collection: Collection) -> StoreResult<Vec<Value>>;

    /// Documents whose top-level `field` equals `value`.
    async fn find_by_field(&self, collection: Collection, field: &str, value: &Value) -> StoreResult<Vec<Value>>;
}

pub fn to_document<T: Serialize>(collection: Collection, key: &str, item: &T) -> StoreResult<Value> {
    serde_json::to_value(item).map_err(|e| StoreError::Malformed {
        collection,
        key: key.to_string(),
        reason: e.to_string(),
    })
}

/// Typed `get`.
pub async fn load<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: Collection,
    key: &str,
) -> StoreResult<Option<T>> {
    match store.get(collection, key).await? {
        Some(doc) => serde_json::from_value(doc)
            .map(Some)
            .map_err(|e| StoreError::Malformed {
                collection,
                key: key.to_string(),
                reason: e.to_string(),
            }),
        None => Ok(None),
    }
}

/// Typed `list`. Documents that do not deserialize are skipped with a warning
/// so one bad record cannot stall the sync job.
pub async fn load_all<T: DeserializeOwned>(store: &dyn DocumentStore, collection: Collection) -> StoreResult<Vec<T>> {
    let docs = store.list(collection).await?;
    Ok(decode_many(collection, docs))
}

/// Typed `find_by_field`.
pub async fn load_where<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: Collection,
    field: &str,
    value: &Value,
) -> StoreResult<Vec<T>> {
    let docs = store.find_by_field(collection, field, value).await?;
    Ok(decode_many(collection, docs))
}

fn decode_many<T: DeserializeOwned>(collection: Collection, docs: Vec<Value>) -> Vec<T> {
    docs.into_iter()
        .filter_map(|doc| {
            let id = doc.get("id").and_then(Value::as_str).unwrap_or("?").to_string();
            match serde_json::from_value(doc) {
                Ok(item) => Some(item),
                Err(e) => {
                    tracing::warn!(collection = %collection, id = %id, error = %e, "Skipping malformed document");
                    None
                }
            }
        })
        .collect()
}
