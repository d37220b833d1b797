use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio_postgres::types::Json;
use tracing::{debug, instrument};

use super::util::TimedClientExt;
use super::{Collection, GetResult, Include, PgPool, Record, StoreError, VectorStore};
use crate::matching::Category;
use crate::metadata::Metadata;

fn table(collection: Collection) -> &'static str {
    match collection {
        Collection::UserProfiles => "tuning.user_profiles",
        Collection::Similarity(Category::Friend) => "tuning.similarity_friend",
        Collection::Similarity(Category::Couple) => "tuning.similarity_couple",
    }
}

fn select_sql(collection: Collection, include: Include, by_ids: bool) -> String {
    let embedding = if include.embeddings {
        "embedding"
    } else {
        "NULL::REAL[]"
    };
    let metadata = if include.metadatas {
        "metadata"
    } else {
        "NULL::JSONB"
    };
    let filter = if by_ids { " WHERE id = ANY($1)" } else { "" };
    format!(
        "SELECT id, {embedding} AS embedding, {metadata} AS metadata FROM {}{filter} ORDER BY id",
        table(collection)
    )
}

fn row_to_record(row: &tokio_postgres::Row) -> Record {
    let metadata: Option<Json<Metadata>> = row.get("metadata");
    Record {
        id: row.get("id"),
        embedding: row.get("embedding"),
        metadata: metadata.map(|Json(m)| m).unwrap_or_default(),
    }
}

type BatchColumns<'a> = (Vec<&'a str>, Vec<Option<Json<&'a [f32]>>>, Vec<Json<&'a Metadata>>);

/// One multi-row statement per batch. Vectors travel as JSONB because `REAL[][]` cannot
/// hold rows of different lengths or a NULL row.
fn batch_insert_sql(collection: Collection, conflict: &str) -> String {
    format!(
        "INSERT INTO {} AS t (id, embedding, metadata, updated_at)
         SELECT u.id,
                CASE WHEN u.embedding IS NULL THEN NULL ELSE ARRAY(
                    SELECT e.value::REAL
                    FROM jsonb_array_elements_text(u.embedding) WITH ORDINALITY AS e(value, n)
                    ORDER BY e.n
                ) END,
                u.metadata,
                NOW()
         FROM UNNEST($1::TEXT[], $2::JSONB[], $3::JSONB[]) AS u(id, embedding, metadata)
         {conflict}",
        table(collection)
    )
}

fn batch_columns(records: &[Record]) -> BatchColumns<'_> {
    let ids = records.iter().map(|r| r.id.as_str()).collect();
    let embeddings = records
        .iter()
        .map(|r| r.embedding.as_deref().map(Json))
        .collect();
    let metadatas = records.iter().map(|r| Json(&r.metadata)).collect();
    (ids, embeddings, metadatas)
}

fn first_repeated_id(records: &[Record]) -> Option<&str> {
    let mut seen = HashSet::new();
    records
        .iter()
        .map(|r| r.id.as_str())
        .find(|id| !seen.insert(*id))
}

/// A single upsert statement may touch each row once. Later records win, and a later
/// record without a vector keeps the vector of an earlier one.
fn collapse_repeated_ids(records: Vec<Record>) -> Vec<Record> {
    let mut position: HashMap<String, usize> = HashMap::new();
    let mut collapsed: Vec<Record> = Vec::with_capacity(records.len());
    for record in records {
        match position.get(&record.id) {
            Some(&i) => {
                let previous = std::mem::replace(&mut collapsed[i], record);
                if collapsed[i].embedding.is_none() {
                    collapsed[i].embedding = previous.embedding;
                }
            }
            None => {
                position.insert(record.id.clone(), collapsed.len());
                collapsed.push(record);
            }
        }
    }
    collapsed
}

/// Postgres-backed collections under the `tuning` schema.
#[derive(Clone)]
pub struct PostgresVectorStore {
    pool: PgPool,
}

impl PostgresVectorStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VectorStore for PostgresVectorStore {
    fn name(&self) -> &'static str {
        "postgres"
    }

    #[instrument(skip(self, ids), fields(collection = collection.name()))]
    async fn get(
        &self,
        collection: Collection,
        ids: Option<&[String]>,
        include: Include,
    ) -> Result<GetResult, StoreError> {
        let client = self.pool.get().await?;

        let rows = match ids {
            Some([]) => return Ok(GetResult::default()),
            Some(ids) => {
                let sql = select_sql(collection, include, true);
                let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
                client.timed_query(sql.as_str(), &[&ids], "vector_get_by_ids").await?
            }
            None => {
                let sql = select_sql(collection, include, false);
                client.timed_query(sql.as_str(), &[], "vector_get_all").await?
            }
        };

        let mut records: Vec<Record> = rows.iter().map(row_to_record).collect();

        // caller order, as with the in-memory store
        if let Some(ids) = ids {
            let position: HashMap<&str, usize> = ids
                .iter()
                .enumerate()
                .rev()
                .map(|(i, id)| (id.as_str(), i))
                .collect();
            records.sort_by_key(|r| position.get(r.id.as_str()).copied().unwrap_or(usize::MAX));
        }

        debug!(count = records.len(), "vector get");
        Ok(GetResult { records })
    }

    #[instrument(skip(self, records), fields(collection = collection.name(), count = records.len()))]
    async fn add(&self, collection: Collection, records: Vec<Record>) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }
        if let Some(id) = first_repeated_id(&records) {
            return Err(StoreError::Duplicate {
                collection: collection.name(),
                id: id.to_string(),
            });
        }

        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        let sql = batch_insert_sql(collection, "ON CONFLICT (id) DO NOTHING RETURNING t.id");
        let (ids, embeddings, metadatas) = batch_columns(&records);
        let rows = tx
            .timed_query(sql.as_str(), &[&ids, &embeddings, &metadatas], "vector_add")
            .await?;

        if rows.len() != records.len() {
            let inserted: HashSet<String> = rows.iter().map(|row| row.get(0)).collect();
            // dropping the transaction rolls the batch back
            if let Some(existing) = records.iter().find(|r| !inserted.contains(&r.id)) {
                return Err(StoreError::Duplicate {
                    collection: collection.name(),
                    id: existing.id.clone(),
                });
            }
        }

        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self, records), fields(collection = collection.name(), count = records.len()))]
    async fn upsert(
        &self,
        collection: Collection,
        records: Vec<Record>,
    ) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }
        let records = collapse_repeated_ids(records);
        let client = self.pool.get().await?;
        let sql = batch_insert_sql(
            collection,
            "ON CONFLICT (id) DO UPDATE SET
                embedding = COALESCE(EXCLUDED.embedding, t.embedding),
                metadata = EXCLUDED.metadata,
                updated_at = NOW()",
        );
        let (ids, embeddings, metadatas) = batch_columns(&records);
        let written = client
            .timed_execute(sql.as_str(), &[&ids, &embeddings, &metadatas], "vector_upsert")
            .await?;
        debug!(written, "vector upsert");
        Ok(())
    }

    #[instrument(skip(self, ids), fields(collection = collection.name(), count = ids.len()))]
    async fn delete(&self, collection: Collection, ids: &[String]) -> Result<(), StoreError> {
        if ids.is_empty() {
            return Ok(());
        }
        let client = self.pool.get().await?;
        let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
        let sql = format!("DELETE FROM {} WHERE id = ANY($1)", table(collection));
        let removed = client
            .timed_execute(sql.as_str(), &[&ids], "vector_delete")
            .await?;
        debug!(removed, "vector delete");
        Ok(())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        let client = self.pool.get().await?;
        client.timed_query("SELECT 1", &[], "health_check").await?;
        Ok(())
    }
}
