// src/pipeline.rs

use anyhow::Result;
use arrow::record_batch::RecordBatch;
use std::fmt;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::duck::DuckSource;
use crate::load::{BatchSink, PgLoader, WriteMode};
use crate::query;

/// Totals for the batches committed during one run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoadSummary {
    pub batches: usize,
    pub rows: u64,
}

/// How a run ended, short of a fatal source failure.
#[derive(Debug)]
pub enum RunOutcome {
    /// Every batch was written.
    Loaded(LoadSummary),
    /// The source produced no rows; the target table was not touched.
    Empty,
    /// PostgreSQL could not be reached; nothing was read or written.
    ConnectionFailed(anyhow::Error),
    /// Reading or writing a batch failed. Batches in `summary` stay committed.
    Interrupted {
        summary: LoadSummary,
        error: anyhow::Error,
    },
}

impl RunOutcome {
    pub fn is_loaded(&self) -> bool {
        matches!(self, RunOutcome::Loaded(_))
    }
}

/// The source could not be opened or queried. Ends the process with status 1.
#[derive(Debug)]
pub struct SourceError(pub anyhow::Error);

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error initializing DuckDB stream: {:#}", self.0)
    }
}

impl std::error::Error for SourceError {}

/// Connect, stream the configured month into the target table, disconnect.
pub async fn run(config: &Config) -> Result<RunOutcome, SourceError> {
    let mut loader = match PgLoader::connect(&config.db).await {
        Ok(loader) => loader,
        Err(err) => {
            error!(error = %format!("{err:#}"), "failed to connect to PostgreSQL");
            return Ok(RunOutcome::ConnectionFailed(err));
        }
    };

    let result = ingest(config, &mut loader).await;
    loader.close().await;
    result
}

async fn ingest(config: &Config, loader: &mut PgLoader) -> Result<RunOutcome, SourceError> {
    let url = config.source_url();
    let sql = query::build_query(&config.source.query_file, &url).map_err(SourceError)?;
    info!(%url, table = loader.table(), "streaming source");

    let source = DuckSource::open(&url).map_err(SourceError)?;
    let mut prepared = source.prepare(&sql).map_err(SourceError)?;
    let batch_size = usize::try_from(config.source.batch_size).unwrap_or(usize::MAX);
    let batches = prepared.batches(batch_size).map_err(SourceError)?;

    let outcome = stream_into(batches, loader).await;
    info!("ingestion job finished");
    Ok(outcome)
}

/// Write every batch into `sink`: the first replaces the table, the rest append.
/// Stops at the first failure.
pub async fn stream_into<I, S>(batches: I, sink: &mut S) -> RunOutcome
where
    I: Iterator<Item = Result<RecordBatch>>,
    S: BatchSink,
{
    let mut summary = LoadSummary::default();

    for next in batches {
        let mode = if summary.batches == 0 {
            WriteMode::Replace
        } else {
            WriteMode::Append
        };
        let written = match next {
            Ok(batch) => sink.write(&batch, mode).await,
            Err(err) => Err(err),
        };

        match written {
            Ok(rows) => {
                summary.batches += 1;
                summary.rows += rows;
                info!(
                    batch = summary.batches,
                    rows,
                    total_rows = summary.rows,
                    ?mode,
                    "batch written"
                );
            }
            Err(error) => {
                error!(
                    batch = summary.batches + 1,
                    error = %format!("{error:#}"),
                    "error during ingestion"
                );
                return RunOutcome::Interrupted { summary, error };
            }
        }
    }

    if summary.batches == 0 {
        warn!("no data found in source stream");
        return RunOutcome::Empty;
    }
    info!(batches = summary.batches, rows = summary.rows, "all batches written");
    RunOutcome::Loaded(summary)
}
