//! LanceDB connection and housekeeping helpers.
//!
//! Opens the database, creates tables on first use, and keeps a key/value
//! `meta` table recording which embedder and dimension filled each document
//! table.

use arrow_array::{RecordBatch, RecordBatchIterator, StringArray};
use arrow_schema::Schema;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection, Table};
use std::sync::Arc;
use tracing::{info, warn};

use zipsa_core::{Result, RetrievalError};

use crate::schema::{build_documents_schema, build_meta_schema, trait_names, vector_dim};
use crate::search::LanceDenseSearcher;
use crate::writer::DenseIndexWriter;

pub const META_TABLE: &str = "meta";

pub async fn open_db(uri: &str) -> Result<Connection> {
    connect(uri).execute().await.map_err(RetrievalError::dense)
}

pub async fn ensure_table(conn: &Connection, name: &str, schema: Arc<Schema>) -> Result<Table> {
    let names = conn.table_names().execute().await.map_err(RetrievalError::dense)?;
    if !names.iter().any(|n| n == name) {
        // create empty table with 0 rows
        let iter = RecordBatchIterator::new(vec![].into_iter(), schema);
        conn.create_table(name, Box::new(iter)).execute().await.map_err(RetrievalError::dense)?;
        info!(table = name, "created table");
    }
    conn.open_table(name).execute().await.map_err(RetrievalError::dense)
}

pub async fn set_meta(conn: &Connection, key: &str, value: &str) -> Result<()> {
    let t = ensure_table(conn, META_TABLE, build_meta_schema()).await?;
    let rb = RecordBatch::try_new(
        build_meta_schema(),
        vec![Arc::new(StringArray::from(vec![key.to_string()])), Arc::new(StringArray::from(vec![value.to_string()]))],
    )
    .map_err(RetrievalError::dense)?;
    let reader = Box::new(RecordBatchIterator::new(vec![Ok(rb)].into_iter(), build_meta_schema()));
    // key is unique
    let mut mi = t.merge_insert(&["key"]);
    mi.when_matched_update_all(None).when_not_matched_insert_all();
    mi.execute(reader).await.map_err(RetrievalError::dense)?;
    Ok(())
}

pub async fn get_meta(conn: &Connection, key: &str) -> Result<Option<String>> {
    let t = ensure_table(conn, META_TABLE, build_meta_schema()).await?;
    let mut stream = t
        .query()
        .only_if(format!("key = '{}'", key.replace('\'', "''")))
        .execute()
        .await
        .map_err(RetrievalError::dense)?;
    while let Some(batch) = futures::TryStreamExt::try_next(&mut stream).await.map_err(RetrievalError::dense)? {
        if batch.num_rows() == 0 { continue; }
        let val = batch
            .column_by_name("value")
            .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            .ok_or_else(|| RetrievalError::dense("meta.value column missing"))?;
        return Ok(Some(val.value(0).to_string()));
    }
    Ok(None)
}

/// A LanceDB document table bound to one embedder.
#[derive(Clone)]
pub struct DenseIndex {
    table: Table,
    dim: usize,
    traits: Vec<String>,
}

impl DenseIndex {
    /// Open (or create) `table` at `uri` for vectors from `embedder_id`.
    ///
    /// The first open records the embedder id and dimension in the meta
    /// table; later opens with a different embedder are refused. An existing
    /// table keeps the trait columns it was created with.
    pub async fn open<S: AsRef<str>>(uri: &str, table: &str, embedder_id: &str, dim: usize, traits: &[S]) -> Result<Self> {
        let conn = open_db(uri).await?;
        let id_key = format!("{table}.embedder_id");
        let dim_key = format!("{table}.dimension");

        match get_meta(&conn, &id_key).await? {
            Some(stored) if stored != embedder_id => {
                return Err(RetrievalError::InvalidConfig(format!(
                    "table '{table}' holds vectors from '{stored}', not '{embedder_id}'"
                )));
            }
            Some(_) => {}
            None => set_meta(&conn, &id_key, embedder_id).await?,
        }
        if let Some(stored) = get_meta(&conn, &dim_key).await? {
            let stored: usize = stored.parse().map_err(|_| RetrievalError::InvalidConfig(format!("bad {dim_key} '{stored}'")))?;
            if stored != dim {
                return Err(RetrievalError::DimensionMismatch { expected: stored, actual: dim });
            }
        } else {
            set_meta(&conn, &dim_key, &dim.to_string()).await?;
        }

        let width = i32::try_from(dim).map_err(|_| RetrievalError::InvalidConfig(format!("dimension {dim} too large")))?;
        let handle = ensure_table(&conn, table, build_documents_schema(width, traits)).await?;
        let schema = handle.schema().await.map_err(RetrievalError::dense)?;
        if let Some(actual) = vector_dim(&schema).filter(|d| *d != dim) {
            return Err(RetrievalError::DimensionMismatch { expected: actual, actual: dim });
        }
        let declared = trait_names(&schema);
        if declared.len() != traits.len() || traits.iter().any(|t| !declared.iter().any(|d| d == t.as_ref())) {
            warn!(table, ?declared, "table trait columns differ from configuration; using the table's");
        }
        Ok(Self { table: handle, dim, traits: declared })
    }

    pub fn dimension(&self) -> usize { self.dim }

    pub fn traits(&self) -> &[String] { &self.traits }

    pub fn writer(&self) -> DenseIndexWriter {
        DenseIndexWriter::new(self.table.clone(), self.dim, self.traits.clone())
    }

    pub fn searcher(&self) -> LanceDenseSearcher {
        LanceDenseSearcher::new(self.table.clone(), self.dim, self.traits.clone())
    }

    pub async fn count(&self) -> Result<usize> {
        self.table.count_rows(None).await.map_err(RetrievalError::dense)
    }
}
