//! LanceDB-backed vector index.

use crate::types::{IndexRecord, Metadata, RetrievedRow};
use crate::vector_index::{sql_in_list, MetadataFilter, VectorIndex};
use arag_core::{AppError, AppResult};
use arrow_array::types::Float32Type;
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray,
    UInt64Array,
};
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{DistanceType, Table};
use std::path::Path;
use std::sync::Arc;

const DISTANCE_COLUMN: &str = "_distance";

/// Persistent vector index stored as a LanceDB table.
pub struct LanceDbIndex {
    table: Table,
    schema: SchemaRef,
    embedding_dim: usize,
}

impl LanceDbIndex {
    /// Open the table at `db_path`, creating it when missing.
    ///
    /// An existing table whose vector width differs from `embedding_dim`
    /// is rejected: it was built with another embedding model.
    pub async fn open(db_path: &Path, table_name: &str, embedding_dim: usize) -> AppResult<Self> {
        std::fs::create_dir_all(db_path).map_err(|e| {
            AppError::Knowledge(format!("Failed to create index directory: {}", e))
        })?;

        let uri = db_path.to_string_lossy().to_string();
        let conn = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| AppError::Knowledge(format!("Failed to connect to LanceDB: {}", e)))?;

        let table_names = conn
            .table_names()
            .execute()
            .await
            .map_err(|e| AppError::Knowledge(format!("Failed to list tables: {}", e)))?;

        let schema = create_schema(embedding_dim);

        let table = if table_names.iter().any(|name| name == table_name) {
            let table = conn
                .open_table(table_name)
                .execute()
                .await
                .map_err(|e| AppError::Knowledge(format!("Failed to open table: {}", e)))?;
            check_dimensions(&table, embedding_dim).await?;
            table
        } else {
            let empty_batch = RecordBatch::new_empty(schema.clone());
            conn.create_table(
                table_name,
                RecordBatchIterator::new(vec![Ok(empty_batch)], schema.clone()),
            )
            .execute()
            .await
            .map_err(|e| AppError::Knowledge(format!("Failed to create table: {}", e)))?
        };

        tracing::debug!("Opened LanceDB table '{}' at {:?}", table_name, db_path);

        Ok(Self {
            table,
            schema,
            embedding_dim,
        })
    }

    fn records_to_batch(&self, records: &[IndexRecord]) -> AppResult<RecordBatch> {
        for record in records {
            if record.embedding.len() != self.embedding_dim {
                return Err(AppError::Knowledge(format!(
                    "Embedding dimension mismatch for {}: expected {}, got {}",
                    record.chunk.chunk_id,
                    self.embedding_dim,
                    record.embedding.len()
                )));
            }
        }

        let metadata = records
            .iter()
            .map(|r| serde_json::to_string(&r.chunk.metadata))
            .collect::<Result<Vec<_>, _>>()?;

        let chunk_ids = StringArray::from_iter_values(records.iter().map(|r| r.chunk.chunk_id.as_str()));
        let doc_ids = StringArray::from_iter_values(records.iter().map(|r| r.chunk.doc_id.as_str()));
        let unit_indexes = UInt64Array::from_iter_values(records.iter().map(|r| r.chunk.unit_index as u64));
        let chunk_indexes = UInt64Array::from_iter_values(records.iter().map(|r| r.chunk.chunk_index as u64));
        let texts = StringArray::from_iter_values(records.iter().map(|r| r.chunk.text.as_str()));
        let embeddings = FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(
            records
                .iter()
                .map(|r| Some(r.embedding.iter().copied().map(Some).collect::<Vec<_>>())),
            self.embedding_dim as i32,
        );
        let metadata = StringArray::from_iter_values(metadata.iter().map(String::as_str));

        RecordBatch::try_new(
            self.schema.clone(),
            vec![
                Arc::new(chunk_ids),
                Arc::new(doc_ids),
                Arc::new(unit_indexes),
                Arc::new(chunk_indexes),
                Arc::new(texts),
                Arc::new(embeddings),
                Arc::new(metadata),
            ],
        )
        .map_err(|e| AppError::Knowledge(format!("Failed to create RecordBatch: {}", e)))
    }

    async fn nearest(
        &self,
        query_embedding: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
        distance_type: DistanceType,
    ) -> AppResult<Vec<RecordBatch>> {
        if query_embedding.len() != self.embedding_dim {
            return Err(AppError::Knowledge(format!(
                "Query embedding dimension mismatch: expected {}, got {}",
                self.embedding_dim,
                query_embedding.len()
            )));
        }

        let mut query = self
            .table
            .query()
            .nearest_to(query_embedding.to_vec())
            .map_err(|e| AppError::Knowledge(format!("Failed to create query: {}", e)))?
            .distance_type(distance_type)
            .limit(k);

        if let Some(filter) = filter {
            query = query.only_if(filter.to_sql());
        }

        query
            .execute()
            .await
            .map_err(|e| AppError::Knowledge(format!("Failed to execute search: {}", e)))?
            .try_collect::<Vec<_>>()
            .await
            .map_err(|e| AppError::Knowledge(format!("Failed to collect results: {}", e)))
    }
}

fn create_schema(embedding_dim: usize) -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("chunk_id", DataType::Utf8, false),
        Field::new("doc_id", DataType::Utf8, false),
        Field::new("unit_index", DataType::UInt64, false),
        Field::new("chunk_index", DataType::UInt64, false),
        Field::new("text", DataType::Utf8, false),
        Field::new(
            "embedding",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                embedding_dim as i32,
            ),
            false,
        ),
        // Full chunk metadata as JSON
        Field::new("metadata", DataType::Utf8, false),
    ]))
}

async fn check_dimensions(table: &Table, embedding_dim: usize) -> AppResult<()> {
    let schema = table
        .schema()
        .await
        .map_err(|e| AppError::Knowledge(format!("Failed to read table schema: {}", e)))?;

    let existing = schema
        .field_with_name("embedding")
        .ok()
        .and_then(|field| match field.data_type() {
            DataType::FixedSizeList(_, size) => Some(*size as usize),
            _ => None,
        });

    match existing {
        Some(size) if size == embedding_dim => Ok(()),
        Some(size) => Err(AppError::Knowledge(format!(
            "Index was built with {}-dimensional embeddings, but the configured model produces {}. \
             Clear the index or switch back to the original embedding model.",
            size, embedding_dim
        ))),
        None => Err(AppError::Knowledge(
            "Index table has no embedding column".to_string(),
        )),
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> AppResult<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| AppError::Knowledge(format!("Invalid {} column", name)))
}

/// Convert result batches to rows, reading `_distance` when `scored`.
fn batches_to_rows(batches: &[RecordBatch], scored: bool) -> AppResult<Vec<RetrievedRow>> {
    let mut rows = Vec::new();

    for batch in batches {
        let chunk_ids = string_column(batch, "chunk_id")?;
        let texts = string_column(batch, "text")?;
        let metadata = string_column(batch, "metadata")?;
        let distances = if scored {
            Some(
                batch
                    .column_by_name(DISTANCE_COLUMN)
                    .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                    .ok_or_else(|| {
                        AppError::Knowledge("Search result has no distance column".to_string())
                    })?,
            )
        } else {
            None
        };

        for row_idx in 0..batch.num_rows() {
            let metadata: Metadata = match serde_json::from_str(metadata.value(row_idx)) {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!("Skipping row {} with unreadable metadata: {}", row_idx, e);
                    continue;
                }
            };

            rows.push(RetrievedRow {
                chunk_id: chunk_ids.value(row_idx).to_string(),
                // Cosine distance to similarity
                score: distances.map(|d| 1.0 - d.value(row_idx)),
                text: texts.value(row_idx).to_string(),
                metadata,
            });
        }
    }

    Ok(rows)
}

#[async_trait]
impl VectorIndex for LanceDbIndex {
    fn backend_name(&self) -> &str {
        "lancedb"
    }

    async fn upsert(&self, records: &[IndexRecord]) -> AppResult<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let batch = self.records_to_batch(records)?;
        let reader = Box::new(RecordBatchIterator::new(
            vec![Ok(batch)],
            self.schema.clone(),
        ));

        // Single commit: matched chunk ids are replaced, new ones inserted
        let mut merge = self.table.merge_insert(&["chunk_id"]);
        merge
            .when_matched_update_all(None)
            .when_not_matched_insert_all();
        merge
            .execute(reader)
            .await
            .map_err(|e| AppError::Knowledge(format!("Failed to upsert chunks batch: {}", e)))?;

        tracing::debug!("Wrote {} chunks to LanceDB", records.len());
        Ok(records.len())
    }

    async fn search_scored(
        &self,
        query_embedding: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> AppResult<Vec<RetrievedRow>> {
        let batches = self
            .nearest(query_embedding, k, filter, DistanceType::Cosine)
            .await?;
        let mut rows = batches_to_rows(&batches, true)?;
        rows.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(rows)
    }

    async fn search(
        &self,
        query_embedding: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> AppResult<Vec<RetrievedRow>> {
        let batches = self
            .nearest(query_embedding, k, filter, DistanceType::Cosine)
            .await?;
        batches_to_rows(&batches, false)
    }

    async fn delete_doc(&self, doc_id: &str) -> AppResult<()> {
        let predicate = sql_in_list("doc_id", &[doc_id.to_string()]);
        self.table
            .delete(&predicate)
            .await
            .map_err(|e| AppError::Knowledge(format!("Failed to delete {}: {}", doc_id, e)))?;

        tracing::debug!("Removed chunks of {} from LanceDB", doc_id);
        Ok(())
    }

    async fn count(&self) -> AppResult<usize> {
        self.table
            .count_rows(None)
            .await
            .map_err(|e| AppError::Knowledge(format!("Failed to count rows: {}", e)))
    }

    async fn reset(&self) -> AppResult<()> {
        self.table
            .delete("chunk_id IS NOT NULL")
            .await
            .map_err(|e| AppError::Knowledge(format!("Failed to reset index: {}", e)))?;

        tracing::info!("Reset LanceDB index");
        Ok(())
    }
}
