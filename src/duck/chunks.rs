// src/duck/chunks.rs

use anyhow::{anyhow, Result};
use arrow::record_batch::RecordBatch;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

/// Turns a chunk iterator that panics on fetch errors into one that yields
/// `Err` instead. DuckDB's arrow stream aborts with a panic when a fetch
/// fails after execution started (e.g. the connection to the remote file drops).
///
/// After the first error the iterator is fused and never touches `inner` again.
pub struct CheckedChunks<I> {
    inner: I,
    failed: bool,
}

impl<I> CheckedChunks<I>
where
    I: Iterator<Item = RecordBatch>,
{
    pub fn new(inner: I) -> Self {
        Self {
            inner,
            failed: false,
        }
    }
}

impl<I> Iterator for CheckedChunks<I>
where
    I: Iterator<Item = RecordBatch>,
{
    type Item = Result<RecordBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match panic::catch_unwind(AssertUnwindSafe(|| self.inner.next())) {
            Ok(chunk) => chunk.map(Ok),
            Err(payload) => {
                self.failed = true;
                Some(Err(anyhow!(
                    "fetching record batch from DuckDB: {}",
                    panic_message(payload.as_ref())
                )))
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        *msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown panic"
    }
}
