//! Periodic checkpoint writer.

use std::{sync::Arc, time::Duration};

use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
   Error,
   checkpoint::{
      CheckpointStore,
      slots::{SlotTable, Watermark, safe_floor},
   },
   types::Seq,
};

/// What a single flush tick did.
#[derive(Debug)]
pub enum FlushOutcome {
   /// Slot files now resume from this sequence number.
   Saved(Seq),
   /// Nothing moved since the last save.
   Unchanged(Seq),
   /// At least one worker has not completed an item yet.
   Pending { unset: usize },
   /// Writing failed; the next tick retries.
   Failed(Error),
}

impl FlushOutcome {
   /// Resume point on disk after this flush, when it is known.
   pub const fn seq(&self) -> Option<Seq> {
      match self {
         Self::Saved(seq) | Self::Unchanged(seq) => Some(*seq),
         Self::Pending { .. } | Self::Failed(_) => None,
      }
   }
}

/// Owns the checkpoint store while the pipeline runs. It is the only writer.
pub struct Flusher {
   store:      CheckpointStore,
   slots:      SlotTable,
   cursor:     Arc<Watermark>,
   last_saved: Option<Vec<Seq>>,
}

impl Flusher {
   pub fn new(store: CheckpointStore, slots: SlotTable, cursor: Arc<Watermark>) -> Self {
      Self { store, slots, cursor, last_saved: None }
   }

   /// Computes the safe floor and writes it if every slot has a value.
   ///
   /// The written value never exceeds the minimum completed sequence number
   /// across workers, nor the reader cursor.
   pub fn flush_once(&mut self) -> FlushOutcome {
      let snapshot = self.slots.snapshot();
      let Some(floor) = safe_floor(&snapshot) else {
         let unset = snapshot.iter().filter(|s| s.is_none()).count();
         tracing::debug!(unset, "checkpoint skipped: workers without a completed item");
         return FlushOutcome::Pending { unset };
      };

      let mut values: Vec<Seq> = snapshot.into_iter().flatten().collect();
      let mut floor = floor;
      if let Some(cursor) = self.cursor.get() {
         floor = floor.min(cursor);
         for v in &mut values {
            *v = (*v).min(cursor);
         }
      }

      if self.last_saved.as_ref() == Some(&values) {
         return FlushOutcome::Unchanged(floor);
      }

      match self.store.save(&values) {
         Ok(()) => {
            tracing::info!(seq = floor, "checkpoint saved: seq={floor}");
            self.last_saved = Some(values);
            FlushOutcome::Saved(floor)
         },
         Err(e) => {
            tracing::warn!("checkpoint write failed, retrying next tick: {e}");
            self.last_saved = None;
            FlushOutcome::Failed(e)
         },
      }
   }

   /// Flushes every `interval` until `cancel` fires, then flushes once more
   /// and returns the outcome of that final flush.
   pub async fn run(mut self, interval: Duration, cancel: CancellationToken) -> FlushOutcome {
      let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

      loop {
         tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
               self.flush_once();
            }
         }
      }

      let outcome = self.flush_once();
      tracing::info!(?outcome, "final checkpoint flush");
      outcome
   }
}
