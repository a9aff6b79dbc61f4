// src/duck/rebatch.rs

use anyhow::{anyhow, Context, Result};
use arrow::compute::concat_batches;
use arrow::record_batch::RecordBatch;
use std::collections::VecDeque;

/// Regroups an iterator of arbitrarily sized record batches into batches of
/// exactly `batch_size` rows. Only the final batch may be shorter.
///
/// Input batches are buffered only until enough rows are available, so the
/// underlying iterator is advanced on demand. An input error is passed on
/// immediately and ends the sequence; rows buffered before it are dropped.
pub struct Rebatch<I> {
    inner: I,
    batch_size: usize,
    pending: VecDeque<RecordBatch>,
    pending_rows: usize,
    exhausted: bool,
}

impl<I> Rebatch<I>
where
    I: Iterator<Item = Result<RecordBatch>>,
{
    pub fn new(inner: I, batch_size: usize) -> Self {
        Self {
            inner,
            batch_size: batch_size.max(1),
            pending: VecDeque::new(),
            pending_rows: 0,
            exhausted: false,
        }
    }

    /// Pop `rows` rows off the front of the buffer as a single batch.
    fn take(&mut self, rows: usize) -> Result<RecordBatch> {
        let mut parts = Vec::new();
        let mut remaining = rows;

        while remaining > 0 {
            let Some(front) = self.pending.pop_front() else {
                break;
            };
            let len = front.num_rows();
            if len <= remaining {
                remaining -= len;
                parts.push(front);
            } else {
                parts.push(front.slice(0, remaining));
                self.pending.push_front(front.slice(remaining, len - remaining));
                remaining = 0;
            }
        }
        self.pending_rows -= rows - remaining;

        if parts.len() == 1 {
            return Ok(parts.swap_remove(0));
        }
        let schema = parts
            .first()
            .map(RecordBatch::schema)
            .ok_or_else(|| anyhow!("no buffered rows to emit"))?;
        concat_batches(&schema, &parts).context("concatenating engine chunks into a batch")
    }
}

impl<I> Iterator for Rebatch<I>
where
    I: Iterator<Item = Result<RecordBatch>>,
{
    type Item = Result<RecordBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.exhausted && self.pending_rows < self.batch_size {
            match self.inner.next() {
                Some(Ok(chunk)) if chunk.num_rows() == 0 => {}
                Some(Ok(chunk)) => {
                    self.pending_rows += chunk.num_rows();
                    self.pending.push_back(chunk);
                }
                Some(Err(err)) => {
                    self.exhausted = true;
                    self.pending.clear();
                    self.pending_rows = 0;
                    return Some(Err(err));
                }
                None => self.exhausted = true,
            }
        }

        if self.pending_rows == 0 {
            return None;
        }
        let rows = self.pending_rows.min(self.batch_size);
        Some(self.take(rows))
    }
}
