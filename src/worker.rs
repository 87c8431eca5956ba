//! Worker pool.
//!
//! Each worker owns one checkpoint slot. After every item, successful or
//! not, the worker advances its slot to the item's seq so a bad file never
//! stalls the checkpoint. Failed items are logged and dropped.

use std::{future::Future, sync::Arc, time::Duration};

use serde_json::Value;
use tokio::{
   task::JoinHandle,
   time::{self, Instant},
};
use tokio_util::sync::CancellationToken;

use crate::{
   Result,
   checkpoint::{SlotTable, Watermark},
   extract::Extractor,
   queue::QueueReceiver,
   store::{ACCESS_TYPE_ATTRIBUTE, FileHandle, FileStore},
   types::WorkItem,
   util::millis,
};

/// What the workers need to process an item.
pub struct WorkerContext {
   pub store:         Arc<dyn FileStore>,
   pub extractor:     Arc<dyn Extractor>,
   pub attribute_key: String,
}

/// Per-worker and pool-wide counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
   pub tagged:  u64,
   pub skipped: u64,
   pub failed:  u64,
   /// Workers that had to be aborted at the drain deadline.
   pub aborted: u64,
}

impl WorkerStats {
   pub const fn processed(&self) -> u64 {
      self.tagged + self.skipped + self.failed
   }

   fn merge(&mut self, other: Self) {
      self.tagged += other.tagged;
      self.skipped += other.skipped;
      self.failed += other.failed;
      self.aborted += other.aborted;
   }
}

#[derive(Debug)]
enum Outcome {
   Tagged { access_type: Option<String> },
   Empty,
}

#[derive(Debug, Default)]
struct StepTimes {
   open:    Option<Duration>,
   size:    Option<Duration>,
   extract: Option<Duration>,
   tag:     Option<Duration>,
   access:  Option<Duration>,
   close:   Option<Duration>,
}

fn ms(d: Option<Duration>) -> f64 {
   d.map_or(0.0, millis)
}

async fn timed<F: Future>(slot: &mut Option<Duration>, fut: F) -> F::Output {
   let start = Instant::now();
   let out = fut.await;
   *slot = Some(start.elapsed());
   out
}

pub struct WorkerPool {
   handles: Vec<JoinHandle<WorkerStats>>,
}

impl WorkerPool {
   /// Spawns one worker per slot in `slots`; worker `i` writes slot `i`.
   pub fn spawn(
      ctx: Arc<WorkerContext>,
      queue: QueueReceiver,
      slots: &SlotTable,
      cancel: CancellationToken,
   ) -> Self {
      let handles = (0..slots.len())
         .map(|index| {
            let worker = Worker {
               index,
               ctx: Arc::clone(&ctx),
               queue: queue.clone(),
               slot: slots.slot(index),
            };
            tokio::spawn(worker.run(cancel.clone()))
         })
         .collect();
      Self { handles }
   }

   pub fn len(&self) -> usize {
      self.handles.len()
   }

   pub fn is_empty(&self) -> bool {
      self.handles.is_empty()
   }

   /// Waits for every worker until `timeout` elapses, then aborts the rest.
   pub async fn join(self, timeout: Duration) -> WorkerStats {
      let deadline = Instant::now() + timeout;
      let mut total = WorkerStats::default();
      for (index, mut handle) in self.handles.into_iter().enumerate() {
         match time::timeout_at(deadline, &mut handle).await {
            Ok(Ok(stats)) => total.merge(stats),
            Ok(Err(e)) => tracing::warn!(worker = index, "worker task failed: {e}"),
            Err(_) => {
               tracing::warn!(worker = index, "worker still busy at drain deadline, aborting");
               handle.abort();
               total.aborted += 1;
            },
         }
      }
      total
   }
}

struct Worker {
   index: usize,
   ctx:   Arc<WorkerContext>,
   queue: QueueReceiver,
   slot:  Arc<Watermark>,
}

impl Worker {
   async fn run(self, cancel: CancellationToken) -> WorkerStats {
      let mut stats = WorkerStats::default();
      loop {
         // Cancellation is only observed between items; an item in hand is
         // always finished.
         let item = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            item = self.queue.pop() => item,
         };
         let Some(item) = item else { break };

         match self.process(&item).await {
            Ok(Outcome::Tagged { .. }) => stats.tagged += 1,
            Ok(Outcome::Empty) => stats.skipped += 1,
            Err(_) => stats.failed += 1,
         }
         self.slot.advance(item.seq);
      }
      tracing::debug!(worker = self.index, ?stats, "worker stopped");
      stats
   }

   /// Runs every step for one item and emits the item's log record.
   async fn process(&self, item: &WorkItem) -> Result<Outcome> {
      let started = Instant::now();
      let mut times = StepTimes::default();
      let result = self.steps(item, &mut times).await;
      let total_ms = millis(started.elapsed());
      let queue_depth = self.queue.len();

      match &result {
         Ok(Outcome::Tagged { access_type }) => tracing::info!(
            seq = item.seq,
            path = %item.file_path,
            worker = self.index,
            outcome = "tagged",
            access_type = access_type.as_deref().unwrap_or("unknown"),
            open_ms = ms(times.open),
            size_ms = ms(times.size),
            extract_ms = ms(times.extract),
            tag_ms = ms(times.tag),
            access_ms = ms(times.access),
            close_ms = ms(times.close),
            total_ms,
            queue_depth,
            "processed file"
         ),
         Ok(Outcome::Empty) => tracing::info!(
            seq = item.seq,
            path = %item.file_path,
            worker = self.index,
            outcome = "empty",
            open_ms = ms(times.open),
            size_ms = ms(times.size),
            close_ms = ms(times.close),
            total_ms,
            queue_depth,
            "skipped empty file"
         ),
         Err(e) => tracing::warn!(
            seq = item.seq,
            path = %item.file_path,
            worker = self.index,
            outcome = "failed",
            error = %e,
            open_ms = ms(times.open),
            size_ms = ms(times.size),
            extract_ms = ms(times.extract),
            tag_ms = ms(times.tag),
            close_ms = ms(times.close),
            total_ms,
            queue_depth,
            "failed to process file, dropping it"
         ),
      }
      result
   }

   async fn steps(&self, item: &WorkItem, times: &mut StepTimes) -> Result<Outcome> {
      let store = &self.ctx.store;
      let mut handle = timed(&mut times.open, store.open(&item.file_path)).await?;
      let result = self.tag_open_file(&mut handle, times).await;
      let closed = timed(&mut times.close, store.close(handle)).await;
      let outcome = result?;
      closed?;
      Ok(outcome)
   }

   async fn tag_open_file(&self, handle: &mut FileHandle, times: &mut StepTimes) -> Result<Outcome> {
      let ctx = &self.ctx;
      let size = timed(&mut times.size, ctx.store.size(handle)).await?;
      if size == 0 {
         return Ok(Outcome::Empty);
      }

      let doc = timed(&mut times.extract, ctx.extractor.extract(handle)).await?;
      let path = handle.path().to_string();
      timed(&mut times.tag, ctx.store.set_attribute(&path, &ctx.attribute_key, &doc)).await?;

      let access = timed(&mut times.access, ctx.store.get_attribute(&path, ACCESS_TYPE_ATTRIBUTE)).await;
      let access_type = match access {
         Ok(value) => value.map(|v| match v {
            Value::String(s) => s,
            other => other.to_string(),
         }),
         Err(e) => {
            tracing::debug!(path = %path, "access type unavailable: {e}");
            None
         },
      };
      Ok(Outcome::Tagged { access_type })
   }
}
