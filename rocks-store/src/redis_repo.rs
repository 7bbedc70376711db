use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use rocks_core::repository::{Collection, DocumentStore, StoreError, StoreResult};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::info;

// Documents are hashes of JSON-encoded top-level fields:
//   {prefix}:{collection}:{key}     -> HASH field -> json
//   {prefix}:{collection}:__index   -> SET of keys
// Multi-step operations run as Lua so each is atomic on the server.

const INSERT_IF_ABSENT: &str = r#"
    if redis.call("EXISTS", KEYS[1]) == 1 then
        return 0
    end
    redis.call("HSET", KEYS[1], unpack(ARGV, 2))
    redis.call("SADD", KEYS[2], ARGV[1])
    return 1
"#;

const REPLACE: &str = r#"
    redis.call("DEL", KEYS[1])
    redis.call("HSET", KEYS[1], unpack(ARGV, 2))
    redis.call("SADD", KEYS[2], ARGV[1])
    return 1
"#;

const MERGE: &str = r#"
    if redis.call("EXISTS", KEYS[1]) == 0 then
        return 0
    end
    redis.call("HSET", KEYS[1], unpack(ARGV))
    return 1
"#;

// cjson encodes an empty table as {}, so an emptied set is written as "[]".
const ADD_TO_SET: &str = r#"
    if redis.call("EXISTS", KEYS[1]) == 0 then
        return -1
    end
    local items = {}
    local raw = redis.call("HGET", KEYS[1], ARGV[1])
    if raw then
        local decoded = cjson.decode(raw)
        if type(decoded) == "table" then
            items = decoded
        end
    end
    for _, v in ipairs(items) do
        if v == ARGV[2] then
            return 0
        end
    end
    table.insert(items, ARGV[2])
    table.sort(items)
    redis.call("HSET", KEYS[1], ARGV[1], cjson.encode(items))
    return 1
"#;

const REMOVE_FROM_SET: &str = r#"
    if redis.call("EXISTS", KEYS[1]) == 0 then
        return -1
    end
    local raw = redis.call("HGET", KEYS[1], ARGV[1])
    if not raw then
        return 0
    end
    local decoded = cjson.decode(raw)
    if type(decoded) ~= "table" then
        return 0
    end
    local kept = {}
    local removed = 0
    for _, v in ipairs(decoded) do
        if v == ARGV[2] then
            removed = 1
        else
            table.insert(kept, v)
        end
    end
    if removed == 0 then
        return 0
    end
    if #kept == 0 then
        redis.call("HSET", KEYS[1], ARGV[1], "[]")
    else
        redis.call("HSET", KEYS[1], ARGV[1], cjson.encode(kept))
    end
    return 1
"#;

#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
    prefix: String,
    insert_if_absent: redis::Script,
    replace: redis::Script,
    merge: redis::Script,
    add_to_set: redis::Script,
    remove_from_set: redis::Script,
}

fn backend(e: redis::RedisError) -> StoreError {
    StoreError::Backend(e.to_string())
}

impl RedisStore {
    pub async fn new(connection_string: &str, prefix: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        let conn = client.get_multiplexed_async_connection().await?;
        info!("Connected to Redis document store (prefix {})", prefix);
        Ok(Self {
            conn,
            prefix: prefix.to_string(),
            insert_if_absent: redis::Script::new(INSERT_IF_ABSENT),
            replace: redis::Script::new(REPLACE),
            merge: redis::Script::new(MERGE),
            add_to_set: redis::Script::new(ADD_TO_SET),
            remove_from_set: redis::Script::new(REMOVE_FROM_SET),
        })
    }

    fn doc_key(&self, collection: Collection, key: &str) -> String {
        format!("{}:{}:{}", self.prefix, collection, key)
    }

    fn index_key(&self, collection: Collection) -> String {
        format!("{}:{}:__index", self.prefix, collection)
    }

    /// Flattens an object into `field, json, field, json, ..`.
    fn encode_fields(collection: Collection, key: &str, data: Value) -> StoreResult<Vec<String>> {
        let map = match data {
            Value::Object(map) if !map.is_empty() => map,
            other => {
                return Err(StoreError::Malformed {
                    collection,
                    key: key.to_string(),
                    reason: format!("expected a non-empty object, got {}", other),
                })
            }
        };
        let mut args = Vec::with_capacity(map.len() * 2);
        for (field, value) in map {
            args.push(field);
            args.push(value.to_string());
        }
        Ok(args)
    }

    fn decode_fields(collection: Collection, key: &str, fields: HashMap<String, String>) -> StoreResult<Option<Value>> {
        if fields.is_empty() {
            return Ok(None);
        }
        let mut map = Map::with_capacity(fields.len());
        for (field, raw) in fields {
            let value = serde_json::from_str(&raw).map_err(|e| StoreError::Malformed {
                collection,
                key: key.to_string(),
                reason: format!("field {}: {}", field, e),
            })?;
            map.insert(field, value);
        }
        Ok(Some(Value::Object(map)))
    }

    async fn run_set_script(
        &self,
        script: &redis::Script,
        collection: Collection,
        key: &str,
        field: &str,
        value: &str,
    ) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let result: i64 = script
            .key(self.doc_key(collection, key))
            .arg(field)
            .arg(value)
            .invoke_async(&mut conn)
            .await
            .map_err(backend)?;
        match result {
            -1 => Err(StoreError::NotFound {
                collection,
                key: key.to_string(),
            }),
            n => Ok(n == 1),
        }
    }
}

#[async_trait]
impl DocumentStore for RedisStore {
    async fn get(&self, collection: Collection, key: &str) -> StoreResult<Option<Value>> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = conn.hgetall(self.doc_key(collection, key)).await.map_err(backend)?;
        Self::decode_fields(collection, key, fields)
    }

    async fn set(&self, collection: Collection, key: &str, data: Value) -> StoreResult<()> {
        let fields = Self::encode_fields(collection, key, data)?;
        let mut conn = self.conn.clone();
        let _: i64 = self
            .replace
            .key(self.doc_key(collection, key))
            .key(self.index_key(collection))
            .arg(key)
            .arg(fields)
            .invoke_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn update(&self, collection: Collection, key: &str, partial: Value) -> StoreResult<()> {
        let fields = Self::encode_fields(collection, key, partial)?;
        let mut conn = self.conn.clone();
        let updated: i64 = self
            .merge
            .key(self.doc_key(collection, key))
            .arg(fields)
            .invoke_async(&mut conn)
            .await
            .map_err(backend)?;
        if updated == 0 {
            return Err(StoreError::NotFound {
                collection,
                key: key.to_string(),
            });
        }
        Ok(())
    }

    async fn insert_if_absent(&self, collection: Collection, key: &str, data: Value) -> StoreResult<bool> {
        let fields = Self::encode_fields(collection, key, data)?;
        let mut conn = self.conn.clone();
        let inserted: i64 = self
            .insert_if_absent
            .key(self.doc_key(collection, key))
            .key(self.index_key(collection))
            .arg(key)
            .arg(fields)
            .invoke_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(inserted == 1)
    }

    async fn add_to_set(&self, collection: Collection, key: &str, field: &str, value: &str) -> StoreResult<bool> {
        self.run_set_script(&self.add_to_set, collection, key, field, value).await
    }

    async fn remove_from_set(
        &self,
        collection: Collection,
        key: &str,
        field: &str,
        value: &str,
    ) -> StoreResult<bool> {
        self.run_set_script(&self.remove_from_set, collection, key, field, value).await
    }

    async fn delete(&self, collection: Collection, key: &str) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let (deleted, _): (i64, i64) = redis::pipe()
            .atomic()
            .del(self.doc_key(collection, key))
            .srem(self.index_key(collection), key)
            .query_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(deleted > 0)
    }

    async fn list(&self, collection: Collection) -> StoreResult<Vec<Value>> {
        let mut conn = self.conn.clone();
        let mut keys: Vec<String> = conn.smembers(self.index_key(collection)).await.map_err(backend)?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        keys.sort();

        let mut pipe = redis::pipe();
        for key in &keys {
            pipe.hgetall(self.doc_key(collection, key));
        }
        let rows: Vec<HashMap<String, String>> = pipe.query_async(&mut conn).await.map_err(backend)?;

        let mut docs = Vec::with_capacity(rows.len());
        for (key, fields) in keys.iter().zip(rows) {
            // Index entries can outlive a document deleted outside this adapter.
            if let Some(doc) = Self::decode_fields(collection, key, fields)? {
                docs.push(doc);
            }
        }
        Ok(docs)
    }

    async fn find_by_field(&self, collection: Collection, field: &str, value: &Value) -> StoreResult<Vec<Value>> {
        let docs = self.list(collection).await?;
        Ok(docs.into_iter().filter(|doc| doc.get(field) == Some(value)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fields_encode_as_json_pairs() {
        let args = RedisStore::encode_fields(
            Collection::Tours,
            "t",
            json!({"id": "t", "occupied_dates": ["2025-06-01"]}),
        )
        .unwrap();
        assert_eq!(args, vec!["id", "\"t\"", "occupied_dates", "[\"2025-06-01\"]"]);
    }

    #[test]
    fn test_empty_hash_is_absent() {
        let decoded = RedisStore::decode_fields(Collection::Tours, "t", HashMap::new()).unwrap();
        assert!(decoded.is_none());
    }

    #[test]
    fn test_decode_round_trips_nested_values() {
        let mut fields = HashMap::new();
        fields.insert("price".to_string(), "\"65.50\"".to_string());
        fields.insert("occupied_dates".to_string(), "[]".to_string());
        let doc = RedisStore::decode_fields(Collection::Tours, "t", fields).unwrap().unwrap();
        assert_eq!(doc["price"], "65.50");
        assert_eq!(doc["occupied_dates"], json!([]));
    }

    #[test]
    fn test_non_object_documents_are_rejected() {
        assert!(RedisStore::encode_fields(Collection::Tours, "t", json!([1, 2])).is_err());
        assert!(RedisStore::encode_fields(Collection::Tours, "t", json!({})).is_err());
    }
}
