//! Wires the feed reader, work queue, worker pool and checkpoint flusher
//! together and runs them through `Loading → Running → Draining → Stopped`.

use std::{path::PathBuf, sync::Arc, time::Duration};

use tokio_util::sync::CancellationToken;

use crate::{
   Result,
   checkpoint::{CheckpointStore, FlushOutcome, Flusher, SlotTable, Watermark},
   config::Config,
   error::Error,
   extract::Extractor,
   feed::{ChangeFeed, FeedFilter, FeedReader, ReaderStats},
   queue::work_queue,
   store::FileStore,
   types::Seq,
   worker::{WorkerContext, WorkerPool, WorkerStats},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
   Loading,
   Running,
   Draining,
   Stopped,
}

/// Tunables for one run.
#[derive(Debug, Clone)]
pub struct RunSettings {
   pub workers:         usize,
   pub queue_capacity:  usize,
   pub flush_interval:  Duration,
   pub reconnect_delay: Duration,
   pub drain_timeout:   Duration,
   pub start_seq:       Option<Seq>,
   pub filter:          FeedFilter,
   pub attribute_key:   String,
   pub checkpoint_dir:  PathBuf,
}

impl RunSettings {
   pub fn from_config(cfg: &Config) -> Self {
      Self {
         workers:         cfg.workers,
         queue_capacity:  cfg.queue_capacity,
         flush_interval:  cfg.flush_interval(),
         reconnect_delay: cfg.reconnect_delay(),
         drain_timeout:   cfg.drain_timeout(),
         start_seq:       cfg.start_seq,
         filter:          cfg.feed_filter(),
         attribute_key:   cfg.attribute_key.clone(),
         checkpoint_dir:  cfg.checkpoint_dir.clone(),
      }
   }
}

/// External collaborators the pipeline runs against.
#[derive(Clone)]
pub struct Collaborators {
   pub feed:      Arc<dyn ChangeFeed>,
   pub store:     Arc<dyn FileStore>,
   pub extractor: Arc<dyn Extractor>,
}

/// Summary of a completed run.
#[derive(Debug)]
pub struct RunReport {
   pub resumed_from: Option<Seq>,
   pub reader:       ReaderStats,
   pub workers:      WorkerStats,
   pub final_flush:  FlushOutcome,
}

pub struct Orchestrator {
   settings: RunSettings,
   collab:   Collaborators,
   phase:    Phase,
}

impl Orchestrator {
   pub fn new(settings: RunSettings, collab: Collaborators) -> Self {
      Self { settings, collab, phase: Phase::Loading }
   }

   pub const fn phase(&self) -> Phase {
      self.phase
   }

   fn enter(&mut self, phase: Phase) {
      tracing::info!(from = ?self.phase, to = ?phase, "orchestrator phase change");
      self.phase = phase;
   }

   /// Decides the resume point and collapses the checkpoint directory to it.
   ///
   /// A configured start sequence wins over whatever the directory holds.
   fn load(&self) -> Result<(CheckpointStore, Option<Seq>)> {
      let store = CheckpointStore::open(&self.settings.checkpoint_dir)?;
      let saved = store.load()?;
      let resume = match self.settings.start_seq {
         Some(seq) => {
            tracing::info!(seq, saved = ?saved, "start sequence overrides saved checkpoint");
            Some(seq)
         },
         None => saved,
      };
      store.reset_floor(resume)?;
      Ok((store, resume))
   }

   /// Runs the pipeline until `shutdown` fires, then drains and flushes.
   ///
   /// Only loading the checkpoint directory can fail; anything after that
   /// is logged and absorbed.
   pub async fn run(&mut self, shutdown: CancellationToken) -> Result<RunReport> {
      let (store, resume) = self.load()?;
      match resume {
         Some(seq) => tracing::info!(seq, "resuming change feed after seq={seq}"),
         None => tracing::info!("no checkpoint found, starting from the feed's default position"),
      }

      let (tx, rx) = work_queue(self.settings.queue_capacity);
      let slots = SlotTable::new(self.settings.workers);
      let cursor = Arc::new(Watermark::new(resume));
      let flusher = Flusher::new(store, slots.clone(), Arc::clone(&cursor));

      self.enter(Phase::Running);
      let work_cancel = shutdown.child_token();
      let flush_cancel = CancellationToken::new();

      let reader = FeedReader::new(
         Arc::clone(&self.collab.feed),
         self.settings.filter.clone(),
         tx,
         cursor,
         self.settings.reconnect_delay,
      );
      let reader_task = tokio::spawn(reader.run(resume, work_cancel.clone()));

      let ctx = Arc::new(WorkerContext {
         store:         Arc::clone(&self.collab.store),
         extractor:     Arc::clone(&self.collab.extractor),
         attribute_key: self.settings.attribute_key.clone(),
      });
      let pool = WorkerPool::spawn(ctx, rx, &slots, work_cancel.clone());
      let flusher_task =
         tokio::spawn(flusher.run(self.settings.flush_interval, flush_cancel.clone()));
      tracing::info!(workers = pool.len(), "pipeline running");

      shutdown.cancelled().await;
      self.enter(Phase::Draining);
      work_cancel.cancel();

      let reader_stats = reader_task.await.unwrap_or_else(|e| {
         tracing::warn!("feed reader task failed: {e}");
         ReaderStats::default()
      });
      let worker_stats = pool.join(self.settings.drain_timeout).await;

      flush_cancel.cancel();
      let final_flush = flusher_task.await.unwrap_or_else(|e| {
         tracing::warn!("checkpoint flusher task failed: {e}");
         FlushOutcome::Failed(Error::Task { task: "flusher", reason: e.to_string() })
      });

      if let Err(e) = self.collab.store.shutdown().await {
         tracing::warn!("file store shutdown failed: {e}");
      }
      self.enter(Phase::Stopped);

      tracing::info!(
         events = reader_stats.events,
         enqueued = reader_stats.enqueued,
         tagged = worker_stats.tagged,
         skipped = worker_stats.skipped,
         failed = worker_stats.failed,
         "pipeline stopped"
      );
      Ok(RunReport {
         resumed_from: resume,
         reader: reader_stats,
         workers: worker_stats,
         final_flush,
      })
   }
}
