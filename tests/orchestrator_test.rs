mod support;

use std::{collections::HashSet, fs, path::Path, sync::Arc, time::Duration};

use changetag::{
   Result,
   checkpoint::CheckpointStore,
   extract::JsonExtractor,
   orchestrator::{Collaborators, Orchestrator, Phase, RunReport, RunSettings},
};
use support::{RecordingStore, ReplayFeed, change, deletion, settings, wait_until};
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct Running {
   shutdown: CancellationToken,
   task:     JoinHandle<(Phase, Result<RunReport>)>,
}

fn launch(settings: RunSettings, feed: &Arc<ReplayFeed>, store: &Arc<RecordingStore>) -> Running {
   let collab = Collaborators {
      feed:      feed.clone(),
      store:     store.clone(),
      extractor: Arc::new(JsonExtractor),
   };
   let shutdown = CancellationToken::new();
   let token = shutdown.clone();
   let task = tokio::spawn(async move {
      let mut orchestrator = Orchestrator::new(settings, collab);
      let report = orchestrator.run(token).await;
      (orchestrator.phase(), report)
   });
   Running { shutdown, task }
}

impl Running {
   async fn stop(self) -> RunReport {
      self.shutdown.cancel();
      let (phase, report) = self.task.await.expect("orchestrator task");
      assert_eq!(phase, Phase::Stopped);
      report.expect("run report")
   }
}

fn saved(dir: &Path) -> Option<u64> {
   CheckpointStore::open(dir).expect("open").load().expect("load")
}

fn slot_names(dir: &Path) -> Vec<String> {
   let mut names: Vec<String> = fs::read_dir(dir)
      .expect("read dir")
      .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
      .filter(|n| n.ends_with(".seq") && !n.starts_with('.'))
      .collect();
   names.sort();
   names
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn tags_matching_files_and_checkpoints() {
   let dir = TempDir::new().expect("temp dir");
   let feed = Arc::new(ReplayFeed::new(vec![
      change(1, "/s/a.json"),
      change(2, "/s/b.txt"),
      change(3, "/s/c.json"),
      deletion(4, "/s/a.json"),
      change(5, "/s/d.json"),
   ]));
   let store = Arc::new(
      RecordingStore::new()
         .with_file("/s/a.json", r#"{"a": 1}"#)
         .with_file("/s/c.json", r#"{"c": 3}"#)
         .with_file("/s/d.json", r#"{"d": 5}"#),
   );
   let run = launch(settings(dir.path(), 1), &feed, &store);

   let path = dir.path().to_path_buf();
   assert!(wait_until(Duration::from_secs(5), || saved(&path) == Some(5)).await);

   let report = run.stop().await;
   assert_eq!(report.resumed_from, None);
   assert_eq!(report.final_flush.seq(), Some(5));
   assert_eq!(report.workers.tagged, 3);
   assert_eq!(report.reader.enqueued, 3);
   assert_eq!(
      store.tagged_paths(),
      ["/s/a.json", "/s/c.json", "/s/d.json"].into_iter().map(String::from).collect::<HashSet<_>>()
   );
   assert!(store.is_shut_down());
   assert_eq!(feed.connects(), vec![None]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn restart_requests_events_after_checkpoint() {
   let dir = TempDir::new().expect("temp dir");
   fs::write(dir.path().join("0.seq"), "42").expect("seed checkpoint");
   let feed = Arc::new(ReplayFeed::new(vec![
      change(41, "/s/old.json"),
      change(42, "/s/done.json"),
      change(43, "/s/new.json"),
   ]));
   let store = Arc::new(
      RecordingStore::new()
         .with_file("/s/old.json", "{}")
         .with_file("/s/done.json", "{}")
         .with_file("/s/new.json", "{}"),
   );
   let run = launch(settings(dir.path(), 1), &feed, &store);

   let path = dir.path().to_path_buf();
   assert!(wait_until(Duration::from_secs(5), || saved(&path) == Some(43)).await);

   let report = run.stop().await;
   assert_eq!(report.resumed_from, Some(42));
   assert_eq!(feed.connects()[0], Some(42));
   assert_eq!(store.tagged_paths().into_iter().collect::<Vec<_>>(), vec!["/s/new.json".to_string()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn legacy_slot_files_are_collapsed_to_their_minimum() {
   let dir = TempDir::new().expect("temp dir");
   for (name, seq) in [("0.seq", "100"), ("1.seq", "80"), ("2.seq", "95"), ("3.seq", "junk")] {
      fs::write(dir.path().join(name), seq).expect("seed slot");
   }
   let feed = Arc::new(ReplayFeed::new(Vec::new()));
   let store = Arc::new(RecordingStore::new());
   let run = launch(settings(dir.path(), 1), &feed, &store);

   let connects = Arc::clone(&feed);
   assert!(wait_until(Duration::from_secs(5), || !connects.connects().is_empty()).await);
   assert_eq!(feed.connects()[0], Some(80));
   assert_eq!(slot_names(dir.path()), vec!["0.seq".to_string()]);
   assert_eq!(saved(dir.path()), Some(80));

   let report = run.stop().await;
   // The only worker never completed an item, so the floor stays put.
   assert!(report.final_flush.seq().is_none());
   assert_eq!(saved(dir.path()), Some(80));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn start_seq_overrides_checkpoint() {
   let dir = TempDir::new().expect("temp dir");
   fs::write(dir.path().join("0.seq"), "10").expect("seed");
   fs::write(dir.path().join("1.seq"), "7").expect("seed");
   let feed = Arc::new(ReplayFeed::new(vec![change(15, "/s/skip.json"), change(21, "/s/x.json")]));
   let store = Arc::new(
      RecordingStore::new().with_file("/s/skip.json", "{}").with_file("/s/x.json", "{}"),
   );
   let mut cfg = settings(dir.path(), 1);
   cfg.start_seq = Some(20);
   let run = launch(cfg, &feed, &store);

   let path = dir.path().to_path_buf();
   assert!(wait_until(Duration::from_secs(5), || saved(&path) == Some(21)).await);

   let report = run.stop().await;
   assert_eq!(report.resumed_from, Some(20));
   assert_eq!(feed.connects()[0], Some(20));
   assert!(!store.tagged_paths().contains("/s/skip.json"));
   assert_eq!(slot_names(dir.path()), vec!["0.seq".to_string()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn second_run_continues_where_first_stopped() {
   let dir = TempDir::new().expect("temp dir");
   let feed = Arc::new(ReplayFeed::new(vec![
      change(1, "/s/a.json"),
      change(2, "/s/b.json"),
      change(3, "/s/c.json"),
   ]));
   let first_store = Arc::new(
      RecordingStore::new()
         .with_file("/s/a.json", "{}")
         .with_file("/s/b.json", "{}")
         .with_file("/s/c.json", "{}"),
   );
   let run = launch(settings(dir.path(), 2), &feed, &first_store);
   assert!(
      wait_until(Duration::from_secs(5), || first_store.tagged_paths().len() == 3).await,
      "first run did not tag everything"
   );
   run.stop().await;
   let first_checkpoint = saved(dir.path());

   feed.append(change(4, "/s/d.json"));
   let second_store = Arc::new(RecordingStore::new().with_file("/s/d.json", "{}"));
   second_store.add_file("/s/c.json", "{}");
   let run = launch(settings(dir.path(), 2), &feed, &second_store);
   assert!(
      wait_until(Duration::from_secs(5), || second_store.tagged_paths().contains("/s/d.json"))
         .await
   );
   run.stop().await;

   let connects = feed.connects();
   assert_eq!(connects[1], first_checkpoint);
   // Anything at or below the first run's checkpoint is never replayed.
   if let Some(cp) = first_checkpoint {
      for seq in 1..=cp {
         let path = format!("/s/{}.json", ["a", "b", "c"][seq as usize - 1]);
         assert!(!second_store.tagged_paths().contains(&path), "{path} replayed");
      }
   }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn feed_failures_do_not_stop_the_pipeline() {
   let dir = TempDir::new().expect("temp dir");
   let feed = Arc::new(ReplayFeed::new(vec![
      "{garbage".to_string(),
      change(1, "/s/missing.json"),
      change(2, "/s/ok.json"),
   ]));
   let store = Arc::new(RecordingStore::new().with_file("/s/ok.json", r#"{"ok": true}"#));
   let run = launch(settings(dir.path(), 1), &feed, &store);

   let path = dir.path().to_path_buf();
   assert!(wait_until(Duration::from_secs(5), || saved(&path) == Some(2)).await);

   let report = run.stop().await;
   assert_eq!(report.reader.malformed, 1);
   assert_eq!(report.workers.failed, 1);
   assert_eq!(report.workers.tagged, 1);
}
