// src/load/mod.rs

use anyhow::{Context, Result};
use arrow::record_batch::RecordBatch;
use futures::pin_mut;
use tokio::task::JoinHandle;
use tokio_postgres::binary_copy::BinaryCopyInWriter;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{Client, NoTls};
use tracing::{debug, error, info, warn};

use crate::config::DbConfig;

pub mod types;

pub use types::{quote_ident, ColumnPlan, ColumnValues};

/// How a batch lands in the target table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Drop and recreate the table from the batch schema, then insert.
    Replace,
    /// Insert into the existing table.
    Append,
}

/// Destination for record batches.
#[allow(async_fn_in_trait)]
pub trait BatchSink {
    /// Persist `batch`, returning the number of rows written.
    async fn write(&mut self, batch: &RecordBatch, mode: WriteMode) -> Result<u64>;
}

/// A single PostgreSQL connection writing into one table.
pub struct PgLoader {
    client: Client,
    table: String,
    driver: JoinHandle<()>,
}

impl PgLoader {
    /// Connect with the command-line credentials.
    pub async fn connect(db: &DbConfig) -> Result<Self> {
        Self::connect_with(db.pg_config(), &db.target_table)
            .await
            .with_context(|| {
                format!(
                    "connecting to postgres at {}:{}/{} as {}",
                    db.host, db.port, db.database, db.user
                )
            })
    }

    /// Connect with an explicit driver config and verify the session.
    pub async fn connect_with(pg: tokio_postgres::Config, table: &str) -> Result<Self> {
        let (client, connection) = pg.connect(NoTls).await?;
        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "postgres connection error");
            }
        });

        client
            .simple_query("SELECT 1")
            .await
            .context("verifying postgres session")?;
        info!(table, "connected to postgres");

        Ok(Self {
            client,
            table: table.to_string(),
            driver,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Rows currently in the target table, `None` if it does not exist.
    pub async fn table_rows(&self) -> Result<Option<i64>> {
        let exists: bool = self
            .client
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM pg_tables \
                 WHERE schemaname = current_schema() AND tablename = $1)",
                &[&self.table],
            )
            .await
            .context("looking up target table")?
            .get(0);
        if !exists {
            return Ok(None);
        }
        let sql = format!("SELECT count(*) FROM {}", quote_ident(&self.table));
        let rows: i64 = self
            .client
            .query_one(sql.as_str(), &[])
            .await
            .context("counting target table rows")?
            .get(0);
        Ok(Some(rows))
    }

    /// Close the session and wait for the connection task to finish.
    pub async fn close(self) {
        let Self { client, driver, .. } = self;
        drop(client);
        if let Err(e) = driver.await {
            warn!(error = %e, "postgres connection task did not shut down cleanly");
        }
        debug!("postgres connection closed");
    }
}

impl BatchSink for PgLoader {
    /// Each batch is written in its own transaction; a failed batch leaves
    /// the table as the previous batch left it.
    async fn write(&mut self, batch: &RecordBatch, mode: WriteMode) -> Result<u64> {
        let columns = types::plan_columns(batch.schema_ref())?;
        let arrays = columns
            .iter()
            .zip(batch.columns())
            .map(|(plan, column)| types::normalize(column, plan))
            .collect::<Result<Vec<_>>>()?;
        let values = arrays
            .iter()
            .map(|array| ColumnValues::decode(array.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        let table = quote_ident(&self.table);

        let tx = self
            .client
            .transaction()
            .await
            .context("starting batch transaction")?;

        if mode == WriteMode::Replace {
            let ddl = format!(
                "DROP TABLE IF EXISTS {table}; {}",
                types::create_table_sql(&table, &columns)
            );
            tx.batch_execute(&ddl)
                .await
                .with_context(|| format!("recreating table {table}"))?;
            debug!(%table, columns = columns.len(), "table recreated");
        }

        let sink = tx
            .copy_in(types::copy_in_sql(&table, &columns).as_str())
            .await
            .with_context(|| format!("starting COPY into {table}"))?;
        let pg_types: Vec<Type> = columns.iter().map(|c| c.pg.clone()).collect();
        let writer = BinaryCopyInWriter::new(sink, &pg_types);
        pin_mut!(writer);

        let mut row_values: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(values.len());
        for row in 0..batch.num_rows() {
            row_values.clear();
            row_values.extend(values.iter().map(|column| column.get(row)));
            writer
                .as_mut()
                .write(&row_values)
                .await
                .with_context(|| format!("writing row {row} into {table}"))?;
        }

        let written = writer
            .finish()
            .await
            .with_context(|| format!("finishing COPY into {table}"))?;
        tx.commit().await.context("committing batch")?;
        Ok(written)
    }
}
