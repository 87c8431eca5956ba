//! Bounded FIFO between the feed reader and the workers.
//!
//! `push` waits while the queue is full, which is how slow workers hold back
//! the feed reader. Nothing is ever dropped for lack of space.

use crate::types::WorkItem;

/// Producer half, owned by the feed reader.
#[derive(Clone)]
pub struct QueueSender {
   tx: flume::Sender<WorkItem>,
}

/// Consumer half, cloned into every worker.
#[derive(Clone)]
pub struct QueueReceiver {
   rx: flume::Receiver<WorkItem>,
}

/// Creates a queue holding at most `capacity` items.
pub fn work_queue(capacity: usize) -> (QueueSender, QueueReceiver) {
   let (tx, rx) = flume::bounded(capacity.max(1));
   (QueueSender { tx }, QueueReceiver { rx })
}

impl QueueSender {
   /// Enqueues `item`, waiting for room. Returns the item back if every
   /// receiver is gone.
   pub async fn push(&self, item: WorkItem) -> Result<(), WorkItem> {
      self.tx.send_async(item).await.map_err(|e| e.into_inner())
   }

   pub fn len(&self) -> usize {
      self.tx.len()
   }

   pub fn is_empty(&self) -> bool {
      self.tx.is_empty()
   }

   pub fn capacity(&self) -> Option<usize> {
      self.tx.capacity()
   }
}

impl QueueReceiver {
   /// Claims the oldest item, waiting while the queue is empty. Returns
   /// `None` once the sender is dropped and the queue is drained.
   pub async fn pop(&self) -> Option<WorkItem> {
      self.rx.recv_async().await.ok()
   }

   pub fn len(&self) -> usize {
      self.rx.len()
   }

   pub fn is_empty(&self) -> bool {
      self.rx.is_empty()
   }
}
