use async_trait::async_trait;
use rocks_core::repository::{Collection, DocumentStore, StoreError, StoreResult};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-process document store for tests and local development.
///
/// Every operation takes the write lock for its whole check-then-write, which
/// gives the same single-document atomicity as the Redis and Postgres backends.
#[derive(Clone, Default)]
pub struct MemoryStore {
    docs: Arc<RwLock<HashMap<Collection, BTreeMap<String, Value>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn as_object(collection: Collection, key: &str, value: Value) -> StoreResult<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Malformed {
            collection,
            key: key.to_string(),
            reason: format!("expected an object, got {}", other),
        }),
    }
}

/// String members of an array field; anything else counts as empty.
fn string_members(doc: &Value, field: &str) -> Vec<String> {
    doc.get(field)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: Collection, key: &str) -> StoreResult<Option<Value>> {
        let docs = self.docs.read().await;
        Ok(docs.get(&collection).and_then(|c| c.get(key)).cloned())
    }

    async fn set(&self, collection: Collection, key: &str, data: Value) -> StoreResult<()> {
        let data = Value::Object(as_object(collection, key, data)?);
        let mut docs = self.docs.write().await;
        docs.entry(collection).or_default().insert(key.to_string(), data);
        Ok(())
    }

    async fn update(&self, collection: Collection, key: &str, partial: Value) -> StoreResult<()> {
        let partial = as_object(collection, key, partial)?;
        let mut docs = self.docs.write().await;
        let doc = docs
            .get_mut(&collection)
            .and_then(|c| c.get_mut(key))
            .ok_or_else(|| StoreError::NotFound {
                collection,
                key: key.to_string(),
            })?;

        if let Value::Object(existing) = doc {
            existing.extend(partial);
        } else {
            *doc = Value::Object(partial);
        }
        Ok(())
    }

    async fn insert_if_absent(&self, collection: Collection, key: &str, data: Value) -> StoreResult<bool> {
        let data = Value::Object(as_object(collection, key, data)?);
        let mut docs = self.docs.write().await;
        let entries = docs.entry(collection).or_default();
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_string(), data);
        Ok(true)
    }

    async fn add_to_set(&self, collection: Collection, key: &str, field: &str, value: &str) -> StoreResult<bool> {
        let mut docs = self.docs.write().await;
        let doc = docs
            .get_mut(&collection)
            .and_then(|c| c.get_mut(key))
            .ok_or_else(|| StoreError::NotFound {
                collection,
                key: key.to_string(),
            })?;

        let mut members = string_members(doc, field);
        if members.iter().any(|m| m == value) {
            return Ok(false);
        }
        members.push(value.to_string());
        members.sort();

        if let Value::Object(map) = doc {
            map.insert(field.to_string(), Value::from(members));
        }
        Ok(true)
    }

    async fn remove_from_set(
        &self,
        collection: Collection,
        key: &str,
        field: &str,
        value: &str,
    ) -> StoreResult<bool> {
        let mut docs = self.docs.write().await;
        let doc = docs
            .get_mut(&collection)
            .and_then(|c| c.get_mut(key))
            .ok_or_else(|| StoreError::NotFound {
                collection,
                key: key.to_string(),
            })?;

        let members = string_members(doc, field);
        if !members.iter().any(|m| m == value) {
            return Ok(false);
        }
        let kept: Vec<String> = members.into_iter().filter(|m| m != value).collect();

        if let Value::Object(map) = doc {
            map.insert(field.to_string(), Value::from(kept));
        }
        Ok(true)
    }

    async fn delete(&self, collection: Collection, key: &str) -> StoreResult<bool> {
        let mut docs = self.docs.write().await;
        Ok(docs
            .get_mut(&collection)
            .map(|c| c.remove(key).is_some())
            .unwrap_or(false))
    }

    async fn list(&self, collection: Collection) -> StoreResult<Vec<Value>> {
        let docs = self.docs.read().await;
        Ok(docs
            .get(&collection)
            .map(|c| c.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn find_by_field(&self, collection: Collection, field: &str, value: &Value) -> StoreResult<Vec<Value>> {
        let docs = self.docs.read().await;
        Ok(docs
            .get(&collection)
            .map(|c| {
                c.values()
                    .filter(|doc| doc.get(field) == Some(value))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_insert_if_absent_is_first_writer_wins() {
        let store = MemoryStore::new();
        assert!(store
            .insert_if_absent(Collection::Bookings, "t_2025-06-01", json!({"id": "a"}))
            .await
            .unwrap());
        assert!(!store
            .insert_if_absent(Collection::Bookings, "t_2025-06-01", json!({"id": "b"}))
            .await
            .unwrap());

        let doc = store.get(Collection::Bookings, "t_2025-06-01").await.unwrap().unwrap();
        assert_eq!(doc["id"], "a");
    }

    #[tokio::test]
    async fn test_concurrent_inserts_have_one_winner() {
        let store = MemoryStore::new();
        let mut handles = Vec::new();
        for i in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .insert_if_absent(Collection::Bookings, "slot", json!({"writer": i}))
                    .await
                    .unwrap()
            }));
        }

        let mut wins = 0;
        for handle in handles {
            if handle.await.unwrap() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
    }

    #[tokio::test]
    async fn test_update_merges_top_level_fields() {
        let store = MemoryStore::new();
        store
            .set(Collection::Tours, "t", json!({"id": "t", "name": "Sintra", "extra": 1}))
            .await
            .unwrap();
        store
            .update(Collection::Tours, "t", json!({"name": "Sintra & Cascais"}))
            .await
            .unwrap();

        let doc = store.get(Collection::Tours, "t").await.unwrap().unwrap();
        assert_eq!(doc["name"], "Sintra & Cascais");
        assert_eq!(doc["extra"], 1);

        let missing = store.update(Collection::Tours, "nope", json!({"a": 1})).await;
        assert!(matches!(missing, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_set_field_operations() {
        let store = MemoryStore::new();
        store.set(Collection::Tours, "t", json!({"id": "t"})).await.unwrap();

        assert!(store.add_to_set(Collection::Tours, "t", "occupied_dates", "2025-06-02").await.unwrap());
        assert!(store.add_to_set(Collection::Tours, "t", "occupied_dates", "2025-06-01").await.unwrap());
        assert!(!store.add_to_set(Collection::Tours, "t", "occupied_dates", "2025-06-01").await.unwrap());

        let doc = store.get(Collection::Tours, "t").await.unwrap().unwrap();
        assert_eq!(doc["occupied_dates"], json!(["2025-06-01", "2025-06-02"]));

        assert!(store.remove_from_set(Collection::Tours, "t", "occupied_dates", "2025-06-01").await.unwrap());
        assert!(!store.remove_from_set(Collection::Tours, "t", "occupied_dates", "2025-06-01").await.unwrap());

        let missing = store.add_to_set(Collection::Tours, "nope", "occupied_dates", "2025-06-01").await;
        assert!(matches!(missing, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_find_by_field() {
        let store = MemoryStore::new();
        store.set(Collection::PaymentTransactions, "1", json!({"payment_id": "pi_1"})).await.unwrap();
        store.set(Collection::PaymentTransactions, "2", json!({"payment_id": "pi_2"})).await.unwrap();

        let found = store
            .find_by_field(Collection::PaymentTransactions, "payment_id", &json!("pi_2"))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert!(store.delete(Collection::PaymentTransactions, "2").await.unwrap());
        assert!(!store.delete(Collection::PaymentTransactions, "2").await.unwrap());
    }
}
