//! Per-worker completion watermarks.
//!
//! Every slot has exactly one writer (its worker, or the feed reader for the
//! cursor) and is read by the flusher. Slots are independent, so there is no
//! lock spanning more than one of them.

use std::{fmt, sync::Arc};

#[cfg(feature = "loom")]
use loom::sync::Mutex;
#[cfg(not(feature = "loom"))]
use parking_lot::Mutex;

use crate::types::Seq;

/// Highest sequence number recorded so far, unset until the first record.
pub struct Watermark {
   inner: Mutex<Option<Seq>>,
}

impl Watermark {
   pub fn new(initial: Option<Seq>) -> Self {
      Self { inner: Mutex::new(initial) }
   }

   /// Raises the watermark to `seq`; never lowers it.
   pub fn advance(&self, seq: Seq) {
      let mut cur = lock(&self.inner);
      *cur = Some(cur.map_or(seq, |c| c.max(seq)));
   }

   pub fn get(&self) -> Option<Seq> {
      *lock(&self.inner)
   }
}

impl Default for Watermark {
   fn default() -> Self {
      Self::new(None)
   }
}

impl fmt::Debug for Watermark {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("Watermark").field("seq", &self.get()).finish()
   }
}

#[cfg(feature = "loom")]
fn lock<T>(m: &Mutex<T>) -> loom::sync::MutexGuard<'_, T> {
   m.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[cfg(not(feature = "loom"))]
fn lock<T>(m: &Mutex<T>) -> parking_lot::MutexGuard<'_, T> {
   m.lock()
}

/// The fixed set of worker slots, indexed by worker number.
#[derive(Debug, Clone)]
pub struct SlotTable {
   slots: Arc<[Arc<Watermark>]>,
}

impl SlotTable {
   pub fn new(workers: usize) -> Self {
      let slots: Vec<Arc<Watermark>> = (0..workers).map(|_| Arc::default()).collect();
      Self { slots: slots.into() }
   }

   pub fn len(&self) -> usize {
      self.slots.len()
   }

   pub fn is_empty(&self) -> bool {
      self.slots.is_empty()
   }

   /// Handle given to worker `index`. Each index goes to exactly one worker.
   pub fn slot(&self, index: usize) -> Arc<Watermark> {
      Arc::clone(&self.slots[index])
   }

   /// Reads every slot once. `None` entries are workers with no completed
   /// item yet.
   pub fn snapshot(&self) -> Vec<Option<Seq>> {
      self.slots.iter().map(|s| s.get()).collect()
   }
}

/// Safe resume point for a slot snapshot: the minimum over all slots, or
/// `None` while any slot is still unset.
pub fn safe_floor(snapshot: &[Option<Seq>]) -> Option<Seq> {
   if snapshot.is_empty() {
      return None;
   }
   snapshot
      .iter()
      .try_fold(Seq::MAX, |acc, slot| slot.map(|s| acc.min(s)))
}
