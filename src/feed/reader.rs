//! Feed reader task.
//!
//! Keeps a connection to the change feed open, filters events, pushes
//! matching ones onto the work queue and owns the resume cursor. Transport
//! failures and end-of-stream lead to a reconnect from the cursor; the loop
//! only ends when it is cancelled.

use std::{sync::Arc, time::Duration};

use futures::StreamExt;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::{
   checkpoint::Watermark,
   error::FeedError,
   feed::{ChangeFeed, FeedStream},
   queue::QueueSender,
   types::{ChangeEvent, Seq},
};

/// Case-insensitive path suffix filter.
#[derive(Debug, Clone)]
pub struct FeedFilter {
   suffix: String,
}

impl FeedFilter {
   pub fn new(suffix: &str) -> Self {
      Self { suffix: suffix.to_ascii_lowercase() }
   }

   pub fn matches(&self, path: &str) -> bool {
      let suffix = self.suffix.as_bytes();
      let path = path.as_bytes();
      path.len() >= suffix.len() && path[path.len() - suffix.len()..].eq_ignore_ascii_case(suffix)
   }
}

/// Counters reported when the reader stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderStats {
   pub connections: u64,
   pub events:      u64,
   pub enqueued:    u64,
   pub malformed:   u64,
   pub duplicates:  u64,
}

enum StreamEnd {
   /// Stream finished or broke; reconnect.
   Reconnect,
   /// Cancelled or nobody is left to consume the queue.
   Stop,
}

pub struct FeedReader {
   feed:            Arc<dyn ChangeFeed>,
   filter:          FeedFilter,
   queue:           QueueSender,
   cursor:          Arc<Watermark>,
   reconnect_delay: Duration,
   stats:           ReaderStats,
}

impl FeedReader {
   pub fn new(
      feed: Arc<dyn ChangeFeed>,
      filter: FeedFilter,
      queue: QueueSender,
      cursor: Arc<Watermark>,
      reconnect_delay: Duration,
   ) -> Self {
      Self { feed, filter, queue, cursor, reconnect_delay, stats: ReaderStats::default() }
   }

   /// Runs until `cancel` fires. `resume` is the position to request on the
   /// first connection; later connections resume from the cursor.
   pub async fn run(mut self, resume: Option<Seq>, cancel: CancellationToken) -> ReaderStats {
      let mut resume = resume;

      while !cancel.is_cancelled() {
         tracing::info!(last_seq = ?resume, "connecting to change feed");
         let connected = tokio::select! {
            () = cancel.cancelled() => break,
            r = self.feed.connect(resume) => r,
         };

         match connected {
            Ok(stream) => {
               self.stats.connections += 1;
               if let StreamEnd::Stop = self.consume(stream, resume, &cancel).await {
                  break;
               }
               tracing::info!(cursor = ?self.cursor.get(), "change feed ended, reconnecting");
            },
            Err(e) => tracing::warn!("change feed connection failed: {e}"),
         }

         if let Some(cursor) = self.cursor.get() {
            resume = Some(resume.map_or(cursor, |r| r.max(cursor)));
         }

         tokio::select! {
            () = cancel.cancelled() => break,
            () = time::sleep(self.reconnect_delay) => {}
         }
      }

      tracing::info!(stats = ?self.stats, "feed reader stopped");
      self.stats
   }

   async fn consume(
      &mut self,
      mut stream: FeedStream,
      floor: Option<Seq>,
      cancel: &CancellationToken,
   ) -> StreamEnd {
      loop {
         let next = tokio::select! {
            () = cancel.cancelled() => return StreamEnd::Stop,
            next = stream.next() => next,
         };

         let line = match next {
            None => return StreamEnd::Reconnect,
            Some(Err(FeedError::LineTooLong { len })) => {
               self.stats.malformed += 1;
               tracing::warn!(len, "dropping change record over the line limit");
               continue;
            },
            Some(Err(e)) => {
               tracing::warn!("change feed read failed: {e}");
               return StreamEnd::Reconnect;
            },
            Some(Ok(line)) => line,
         };

         let event = match ChangeEvent::parse(&line) {
            Ok(event) => event,
            Err(e) => {
               self.stats.malformed += 1;
               let text = String::from_utf8_lossy(&line);
               tracing::warn!("dropping malformed change record: {e}: {}", truncate(&text));
               continue;
            },
         };

         if floor.is_some_and(|f| event.seq <= f) {
            self.stats.duplicates += 1;
            tracing::debug!(seq = event.seq, "skipping event at or below resume point");
            continue;
         }

         self.stats.events += 1;
         let seq = event.seq;
         if let Some(item) = event.into_work_item(|p| self.filter.matches(p)) {
            tracing::debug!(seq, path = %item.file_path, "queueing file");
            let pushed = tokio::select! {
               () = cancel.cancelled() => return StreamEnd::Stop,
               r = self.queue.push(item) => r,
            };
            if pushed.is_err() {
               tracing::warn!("work queue closed, stopping feed reader");
               return StreamEnd::Stop;
            }
            self.stats.enqueued += 1;
         }
         self.cursor.advance(seq);
      }
   }
}

fn truncate(line: &str) -> &str {
   const MAX: usize = 200;
   if line.len() <= MAX {
      return line;
   }
   let mut end = MAX;
   while !line.is_char_boundary(end) {
      end -= 1;
   }
   &line[..end]
}
