use async_trait::async_trait;
use rocks_core::repository::{Collection, DocumentStore, StoreError, StoreResult};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::info;

/// Postgres `jsonb` document store over a single `documents` table.
#[derive(Clone)]
pub struct PgStore {
    pub pool: Pool<Postgres>,
}

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn require_object(collection: Collection, key: &str, data: &Value) -> StoreResult<()> {
    if data.is_object() {
        Ok(())
    } else {
        Err(StoreError::Malformed {
            collection,
            key: key.to_string(),
            reason: format!("expected an object, got {}", data),
        })
    }
}

impl PgStore {
    pub async fn new(connection_string: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        info!("Migrations completed successfully.");
        Ok(())
    }

    async fn exists(&self, collection: Collection, key: &str) -> StoreResult<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM documents WHERE collection = $1 AND key = $2)",
        )
        .bind(collection.as_str())
        .bind(key)
        .fetch_one(&self.pool)
        .await
        .map_err(backend)
    }
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn get(&self, collection: Collection, key: &str) -> StoreResult<Option<Value>> {
        sqlx::query_scalar::<_, Value>("SELECT data FROM documents WHERE collection = $1 AND key = $2")
            .bind(collection.as_str())
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)
    }

    async fn set(&self, collection: Collection, key: &str, data: Value) -> StoreResult<()> {
        require_object(collection, key, &data)?;
        sqlx::query(
            r#"
            INSERT INTO documents (collection, key, data, updated_at)
            VALUES ($1, $2, $3, now())
            ON CONFLICT (collection, key) DO UPDATE SET data = EXCLUDED.data, updated_at = now()
            "#,
        )
        .bind(collection.as_str())
        .bind(key)
        .bind(data)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn update(&self, collection: Collection, key: &str, partial: Value) -> StoreResult<()> {
        require_object(collection, key, &partial)?;
        let result = sqlx::query(
            "UPDATE documents SET data = data || $3, updated_at = now() WHERE collection = $1 AND key = $2",
        )
        .bind(collection.as_str())
        .bind(key)
        .bind(partial)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                collection,
                key: key.to_string(),
            });
        }
        Ok(())
    }

    async fn insert_if_absent(&self, collection: Collection, key: &str, data: Value) -> StoreResult<bool> {
        require_object(collection, key, &data)?;
        let result = sqlx::query(
            r#"
            INSERT INTO documents (collection, key, data, updated_at)
            VALUES ($1, $2, $3, now())
            ON CONFLICT (collection, key) DO NOTHING
            "#,
        )
        .bind(collection.as_str())
        .bind(key)
        .bind(data)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(result.rows_affected() == 1)
    }

    async fn add_to_set(&self, collection: Collection, key: &str, field: &str, value: &str) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE documents
            SET data = jsonb_set(
                    data,
                    ARRAY[$3::text],
                    (CASE WHEN jsonb_typeof(data -> $3::text) = 'array' THEN data -> $3::text ELSE '[]'::jsonb END)
                        || to_jsonb($4::text)
                ),
                updated_at = now()
            WHERE collection = $1 AND key = $2
              AND NOT (jsonb_typeof(data -> $3::text) = 'array' AND (data -> $3::text) ? $4::text)
            "#,
        )
        .bind(collection.as_str())
        .bind(key)
        .bind(field)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }
        if self.exists(collection, key).await? {
            Ok(false)
        } else {
            Err(StoreError::NotFound {
                collection,
                key: key.to_string(),
            })
        }
    }

    async fn remove_from_set(
        &self,
        collection: Collection,
        key: &str,
        field: &str,
        value: &str,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE documents
            SET data = jsonb_set(data, ARRAY[$3::text], (data -> $3::text) - $4::text),
                updated_at = now()
            WHERE collection = $1 AND key = $2
              AND jsonb_typeof(data -> $3::text) = 'array'
              AND (data -> $3::text) ? $4::text
            "#,
        )
        .bind(collection.as_str())
        .bind(key)
        .bind(field)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }
        if self.exists(collection, key).await? {
            Ok(false)
        } else {
            Err(StoreError::NotFound {
                collection,
                key: key.to_string(),
            })
        }
    }

    async fn delete(&self, collection: Collection, key: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = $1 AND key = $2")
            .bind(collection.as_str())
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, collection: Collection) -> StoreResult<Vec<Value>> {
        sqlx::query_scalar::<_, Value>("SELECT data FROM documents WHERE collection = $1 ORDER BY key")
            .bind(collection.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(backend)
    }

    async fn find_by_field(&self, collection: Collection, field: &str, value: &Value) -> StoreResult<Vec<Value>> {
        sqlx::query_scalar::<_, Value>(
            "SELECT data FROM documents WHERE collection = $1 AND data -> $2::text = $3 ORDER BY key",
        )
        .bind(collection.as_str())
        .bind(field)
        .bind(value.clone())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)
    }
}
