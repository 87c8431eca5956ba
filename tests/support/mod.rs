#![allow(dead_code, reason = "each test binary uses a different subset")]

use std::{
   collections::{HashMap, HashSet, VecDeque},
   path::Path,
   sync::atomic::{AtomicBool, AtomicUsize, Ordering},
   time::Duration,
};

use changetag::{
   error::{ExtractError, FeedError, StoreError},
   extract::{Extractor, JsonExtractor},
   feed::{ChangeFeed, FeedFilter, FeedStream},
   orchestrator::RunSettings,
   store::{ACCESS_TYPE_ATTRIBUTE, FileHandle, FileStore},
   types::{ChangeEvent, Seq},
};
use bytes::Bytes;
use futures::{StreamExt, stream};
use parking_lot::Mutex;
use serde_json::{Value, json};

/// Feed line for a live change to `path`.
pub fn change(seq: Seq, path: &str) -> String {
   json!({"seq": seq, "filePath": path, "fileMeta": {"changed": true, "deleted": false}})
      .to_string()
}

/// Feed line for a deletion of `path`.
pub fn deletion(seq: Seq, path: &str) -> String {
   json!({"seq": seq, "filePath": path, "fileMeta": {"changed": true, "deleted": true}})
      .to_string()
}

fn as_bytes(lines: Vec<Result<String, FeedError>>) -> Vec<Result<Bytes, FeedError>> {
   lines.into_iter().map(|line| line.map(Bytes::from)).collect()
}

/// Stream that yields `lines` and then stays open without further events.
fn open_stream(lines: Vec<Result<Bytes, FeedError>>) -> FeedStream {
   stream::iter(lines).chain(stream::pending()).boxed()
}

/// What one call to `connect` produces.
pub enum Connection {
   /// Yields the lines and then ends, forcing a reconnect.
   Lines(Vec<Result<String, FeedError>>),
   /// Yields the lines and then stays open.
   Open(Vec<String>),
   /// Yields raw byte lines, which need not be UTF-8, and stays open.
   Raw(Vec<Vec<u8>>),
   /// `connect` itself fails.
   Refused,
}

/// Feed that plays back a fixed script, one entry per connection. Once the
/// script runs out every connection stays open and silent.
#[derive(Default)]
pub struct ScriptedFeed {
   script:   Mutex<VecDeque<Connection>>,
   connects: Mutex<Vec<Option<Seq>>>,
}

impl ScriptedFeed {
   pub fn new(script: Vec<Connection>) -> Self {
      Self { script: Mutex::new(script.into()), connects: Mutex::default() }
   }

   /// Resume points requested so far, in order.
   pub fn connects(&self) -> Vec<Option<Seq>> {
      self.connects.lock().clone()
   }
}

#[async_trait::async_trait]
impl ChangeFeed for ScriptedFeed {
   async fn connect(&self, last_seq: Option<Seq>) -> Result<FeedStream, FeedError> {
      self.connects.lock().push(last_seq);
      match self.script.lock().pop_front() {
         Some(Connection::Lines(lines)) => Ok(stream::iter(as_bytes(lines)).boxed()),
         Some(Connection::Open(lines)) => {
            Ok(open_stream(as_bytes(lines.into_iter().map(Ok).collect())))
         },
         Some(Connection::Raw(lines)) => {
            Ok(open_stream(lines.into_iter().map(|l| Ok(Bytes::from(l))).collect()))
         },
         Some(Connection::Refused) => {
            Err(FeedError::Status { status: 503, body: "unavailable".to_string() })
         },
         None => Ok(open_stream(Vec::new())),
      }
   }
}

/// Feed that behaves like the provider: every connection replays the
/// history strictly after the requested position and then stays open.
#[derive(Default)]
pub struct ReplayFeed {
   history:  Mutex<Vec<String>>,
   connects: Mutex<Vec<Option<Seq>>>,
}

impl ReplayFeed {
   pub fn new(history: Vec<String>) -> Self {
      Self { history: Mutex::new(history), connects: Mutex::default() }
   }

   pub fn append(&self, line: String) {
      self.history.lock().push(line);
   }

   pub fn connects(&self) -> Vec<Option<Seq>> {
      self.connects.lock().clone()
   }
}

#[async_trait::async_trait]
impl ChangeFeed for ReplayFeed {
   async fn connect(&self, last_seq: Option<Seq>) -> Result<FeedStream, FeedError> {
      self.connects.lock().push(last_seq);
      let lines = self
         .history
         .lock()
         .iter()
         .filter(|line| {
            let seq = ChangeEvent::parse(line).map(|e| e.seq).ok();
            match (seq, last_seq) {
               (Some(seq), Some(after)) => seq > after,
               _ => true,
            }
         })
         .cloned()
         .map(Ok)
         .collect();
      Ok(open_stream(as_bytes(lines)))
   }
}

/// In-memory file store that records every call.
#[derive(Default)]
pub struct RecordingStore {
   files:      Mutex<HashMap<String, Vec<u8>>>,
   attrs:      Mutex<HashMap<(String, String), Value>>,
   delays:     Mutex<HashMap<String, Duration>>,
   tag_writes: Mutex<Vec<(String, Value)>>,
   opened:     AtomicUsize,
   closed:     AtomicUsize,
   shut_down:  AtomicBool,
}

impl RecordingStore {
   pub fn new() -> Self {
      Self::default()
   }

   pub fn with_file(self, path: &str, content: &str) -> Self {
      self.files.lock().insert(path.to_string(), content.as_bytes().to_vec());
      self
   }

   pub fn add_file(&self, path: &str, content: &str) {
      self.files.lock().insert(path.to_string(), content.as_bytes().to_vec());
   }

   /// Makes `open` of `path` take `delay`.
   pub fn with_delay(self, path: &str, delay: Duration) -> Self {
      self.delays.lock().insert(path.to_string(), delay);
      self
   }

   pub fn with_access_type(self, path: &str, access: &str) -> Self {
      self
         .attrs
         .lock()
         .insert((path.to_string(), ACCESS_TYPE_ATTRIBUTE.to_string()), json!(access));
      self
   }

   pub fn attribute(&self, path: &str, key: &str) -> Option<Value> {
      self.attrs.lock().get(&(path.to_string(), key.to_string())).cloned()
   }

   /// Every `set_attribute` call as `(path, value)`, in call order.
   pub fn tag_writes(&self) -> Vec<(String, Value)> {
      self.tag_writes.lock().clone()
   }

   pub fn tagged_paths(&self) -> HashSet<String> {
      self.tag_writes.lock().iter().map(|(p, _)| p.clone()).collect()
   }

   pub fn opened(&self) -> usize {
      self.opened.load(Ordering::SeqCst)
   }

   pub fn closed(&self) -> usize {
      self.closed.load(Ordering::SeqCst)
   }

   pub fn is_shut_down(&self) -> bool {
      self.shut_down.load(Ordering::SeqCst)
   }
}

#[async_trait::async_trait]
impl FileStore for RecordingStore {
   async fn open(&self, path: &str) -> Result<FileHandle, StoreError> {
      let delay = self.delays.lock().get(path).copied();
      if let Some(delay) = delay {
         tokio::time::sleep(delay).await;
      }
      let content =
         self.files.lock().get(path).cloned().ok_or_else(|| StoreError::NotFound(path.to_string()))?;
      self.opened.fetch_add(1, Ordering::SeqCst);
      Ok(FileHandle::new(path, path, Box::new(std::io::Cursor::new(content))))
   }

   async fn size(&self, handle: &mut FileHandle) -> Result<u64, StoreError> {
      let files = self.files.lock();
      files
         .get(handle.id())
         .map(|c| c.len() as u64)
         .ok_or_else(|| StoreError::NotFound(handle.path().to_string()))
   }

   async fn set_attribute(&self, path: &str, key: &str, value: &Value) -> Result<(), StoreError> {
      self.attrs.lock().insert((path.to_string(), key.to_string()), value.clone());
      self.tag_writes.lock().push((path.to_string(), value.clone()));
      Ok(())
   }

   async fn get_attribute(&self, path: &str, key: &str) -> Result<Option<Value>, StoreError> {
      Ok(self.attribute(path, key))
   }

   async fn close(&self, handle: FileHandle) -> Result<(), StoreError> {
      drop(handle);
      self.closed.fetch_add(1, Ordering::SeqCst);
      Ok(())
   }

   async fn shutdown(&self) -> Result<(), StoreError> {
      self.shut_down.store(true, Ordering::SeqCst);
      Ok(())
   }
}

/// JSON extractor that fails for chosen paths.
#[derive(Default)]
pub struct FailingExtractor {
   fail: HashSet<String>,
}

impl FailingExtractor {
   pub fn failing_on(paths: &[&str]) -> Self {
      Self { fail: paths.iter().map(|p| (*p).to_string()).collect() }
   }
}

#[async_trait::async_trait]
impl Extractor for FailingExtractor {
   async fn extract(&self, handle: &mut FileHandle) -> Result<Value, ExtractError> {
      if self.fail.contains(handle.path()) {
         return Err(ExtractError::Parse {
            path:   handle.path().to_string(),
            reason: "injected failure".to_string(),
         });
      }
      JsonExtractor.extract(handle).await
   }
}

/// Settings with short intervals suitable for tests.
pub fn settings(checkpoint_dir: &Path, workers: usize) -> RunSettings {
   RunSettings {
      workers,
      queue_capacity: 64,
      flush_interval: Duration::from_millis(20),
      reconnect_delay: Duration::from_millis(10),
      drain_timeout: Duration::from_secs(5),
      start_seq: None,
      filter: FeedFilter::new(".json"),
      attribute_key: "onedata_json".to_string(),
      checkpoint_dir: checkpoint_dir.to_path_buf(),
   }
}

/// Polls `cond` until it holds or `timeout` passes.
pub async fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
   let deadline = tokio::time::Instant::now() + timeout;
   while tokio::time::Instant::now() < deadline {
      if cond() {
         return true;
      }
      tokio::time::sleep(Duration::from_millis(5)).await;
   }
   cond()
}
