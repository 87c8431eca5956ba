//! Filesystem collaborators: open, size and tag files in the space.

mod local;
mod rest;

use std::fmt;

use serde_json::Value;
use tokio::io::AsyncRead;

pub use local::LocalFileStore;
pub use rest::RestFileStore;

use crate::error::StoreError;

/// Attribute read after tagging to report how the provider reached the
/// file.
pub const ACCESS_TYPE_ATTRIBUTE: &str = "org.onedata.access_type";

/// An open file. The reader yields the file content from the start.
pub struct FileHandle {
   path:   String,
   id:     String,
   reader: Box<dyn AsyncRead + Send + Unpin>,
}

impl FileHandle {
   /// `id` is whatever the owning store needs to find the file again
   /// without resolving the path a second time.
   pub fn new(
      path: impl Into<String>,
      id: impl Into<String>,
      reader: Box<dyn AsyncRead + Send + Unpin>,
   ) -> Self {
      Self { path: path.into(), id: id.into(), reader }
   }

   pub fn path(&self) -> &str {
      &self.path
   }

   pub fn id(&self) -> &str {
      &self.id
   }

   pub fn reader(&mut self) -> &mut (dyn AsyncRead + Send + Unpin) {
      &mut *self.reader
   }
}

impl fmt::Debug for FileHandle {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("FileHandle")
         .field("path", &self.path)
         .field("id", &self.id)
         .finish_non_exhaustive()
   }
}

/// Capability surface the workers use to reach files.
///
/// Paths are the feed's `filePath` values, rooted at the space name
/// (`/<space>/dir/file.json`).
#[async_trait::async_trait]
pub trait FileStore: Send + Sync {
   async fn open(&self, path: &str) -> Result<FileHandle, StoreError>;

   async fn size(&self, handle: &mut FileHandle) -> Result<u64, StoreError>;

   /// Writes `value` under `key`, replacing any previous value. Writing the
   /// same value twice leaves the same state.
   async fn set_attribute(&self, path: &str, key: &str, value: &Value) -> Result<(), StoreError>;

   /// Reads `key`, `Ok(None)` when the attribute is not set.
   async fn get_attribute(&self, path: &str, key: &str) -> Result<Option<Value>, StoreError>;

   async fn close(&self, handle: FileHandle) -> Result<(), StoreError> {
      drop(handle);
      Ok(())
   }

   /// Releases the collaborator. Called once, after every worker stopped.
   async fn shutdown(&self) -> Result<(), StoreError> {
      Ok(())
   }
}
