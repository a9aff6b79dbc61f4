// src/duck/mod.rs

use anyhow::{Context, Result};
use duckdb::{ArrowStream, Connection, Statement};
use tracing::{debug, info};

mod chunks;
mod rebatch;

pub use chunks::CheckedChunks;
pub use rebatch::Rebatch;

/// Batches streamed out of a [`PreparedQuery`].
pub type Batches<'stmt> = Rebatch<CheckedChunks<ArrowStream<'stmt>>>;

/// URL schemes DuckDB can only reach through the `httpfs` extension.
const REMOTE_SCHEMES: &[&str] = &[
    "http://", "https://", "s3://", "s3a://", "s3n://", "gs://", "gcs://", "r2://", "hf://",
];

/// Whether reading `url` needs the `httpfs` extension.
pub fn is_remote(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    REMOTE_SCHEMES.iter().any(|scheme| lower.starts_with(scheme))
}

/// An in-memory DuckDB engine used purely as a parquet reader.
pub struct DuckSource {
    conn: Connection,
}

impl DuckSource {
    /// Open an in-memory DuckDB database able to read `url`.
    pub fn open(url: &str) -> Result<Self> {
        let conn = Connection::open_in_memory().context("opening in-memory DuckDB")?;
        if is_remote(url) {
            debug!("installing httpfs");
            conn.execute_batch("INSTALL httpfs; LOAD httpfs;")
                .context("loading the DuckDB httpfs extension")?;
        }
        Ok(Self { conn })
    }

    /// Prepare `query`. DuckDB binds the parquet file here, so an unreachable
    /// source or a malformed query is reported before anything executes.
    pub fn prepare(&self, query: &str) -> Result<PreparedQuery<'_>> {
        debug!(%query, "preparing");
        let stmt = self
            .conn
            .prepare(query)
            .with_context(|| format!("preparing query `{query}`"))?;
        Ok(PreparedQuery { stmt })
    }
}

/// A prepared statement tied to the lifetime of its [`DuckSource`].
pub struct PreparedQuery<'conn> {
    stmt: Statement<'conn>,
}

impl PreparedQuery<'_> {
    /// Execute and stream the result in batches of `batch_size` rows.
    ///
    /// DuckDB produces result chunks only as the iterator asks for them, so at
    /// most one batch plus one engine chunk is held in memory. The iterator is
    /// forward-only; reading again means executing again.
    pub fn batches(&mut self, batch_size: usize) -> Result<Batches<'_>> {
        let stream = self.stmt.stream_arrow([]).context("executing query")?;
        info!(
            batch_size,
            columns = stream.get_schema().fields().len(),
            "query executed, streaming batches"
        );
        Ok(Rebatch::new(CheckedChunks::new(stream), batch_size))
    }
}
