use std::io;

use thiserror::Error;

/// Main error type for changetag.
///
/// Startup failures (configuration, space resolution, authentication) are
/// the only variants expected to reach `main`. Once the orchestrator is
/// running, errors are logged where they happen and absorbed.
#[derive(Debug, Error)]
pub enum Error {
   /// I/O error occurred during file operations.
   #[error("io error: {0}")]
   Io(#[from] io::Error),

   /// JSON serialization or deserialization error occurred.
   #[error("json error: {0}")]
   Json(#[from] serde_json::Error),

   /// TOML serialization error occurred.
   #[error("toml error: {0}")]
   Toml(#[from] toml::ser::Error),

   /// Change feed transport failed.
   #[error("feed error: {0}")]
   Feed(#[from] FeedError),

   /// A feed line could not be turned into a change event.
   #[error("malformed record: {0}")]
   Record(#[from] RecordError),

   /// Filesystem collaborator failed.
   #[error("store error: {0}")]
   Store(#[from] StoreError),

   /// Metadata extraction failed.
   #[error("extract error: {0}")]
   Extract(#[from] ExtractError),

   /// Checkpoint directory could not be read or written.
   #[error("checkpoint error: {0}")]
   Checkpoint(#[from] CheckpointError),

   /// Configuration-related error occurred.
   #[error("config error: {0}")]
   Config(#[from] ConfigError),

   /// Space could not be resolved at startup.
   #[error("space error: {0}")]
   Space(#[from] SpaceError),

   /// Failed to build the HTTP client.
   #[error("http client error: {0}")]
   HttpClient(#[source] reqwest::Error),

   /// Injected failure (failpoints feature).
   #[error("failpoint {0} triggered")]
   FailPoint(String),

   /// A background task panicked or was aborted.
   #[error("task {task} failed: {reason}")]
   Task { task: &'static str, reason: String },
}

impl Error {
   pub fn exit_code(&self) -> i32 {
      match self {
         Self::Config(_) => 2,
         Self::Space(_) => 3,
         _ => 1,
      }
   }
}

/// Transport errors on the change feed. Always recovered by reconnecting.
#[derive(Debug, Error)]
pub enum FeedError {
   /// Request could not be sent or the connection dropped.
   #[error("request failed: {0}")]
   Request(#[from] reqwest::Error),

   /// Provider answered with a non-success status.
   #[error("unexpected status {status}: {body}")]
   Status { status: u16, body: String },

   /// Reading the streamed body failed.
   #[error("stream read failed: {0}")]
   Stream(String),

   /// One line exceeded the length limit and was dropped. The connection
   /// is still usable.
   #[error("line of {len} bytes exceeds the limit")]
   LineTooLong { len: usize },
}

/// Malformed change record. The record is dropped and no cursor moves.
#[derive(Debug, Error)]
pub enum RecordError {
   #[error("invalid json: {0}")]
   Json(#[source] serde_json::Error),

   #[error("record has no usable seq")]
   MissingSeq,
}

/// Errors from the filesystem collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
   /// Path does not resolve to a file.
   #[error("not found: {0}")]
   NotFound(String),

   /// Path escapes the configured root or is otherwise unusable.
   #[error("invalid path: {0}")]
   InvalidPath(String),

   /// Attribute could not be read or written.
   #[error("attribute {key} on {path}: {reason}")]
   Attribute { path: String, key: String, reason: String },

   /// REST call to the provider failed.
   #[error("http request failed: {0}")]
   Http(#[from] reqwest::Error),

   /// REST call answered with a non-success status.
   #[error("{op} answered {status}")]
   Status { op: &'static str, status: u16 },
}

/// Errors from metadata extraction.
#[derive(Debug, Error)]
pub enum ExtractError {
   /// File content could not be parsed into a document.
   #[error("failed to parse {path}: {reason}")]
   Parse { path: String, reason: String },

   /// File could not be read.
   #[error("failed to read {path}: {source}")]
   Read {
      path:   String,
      #[source]
      source: io::Error,
   },
}

/// Errors around the checkpoint directory.
#[derive(Debug, Error)]
pub enum CheckpointError {
   /// Directory or slot file I/O failed.
   #[error("{op} {path}: {source}")]
   Io {
      op:     &'static str,
      path:   String,
      #[source]
      source: io::Error,
   },
}

/// Configuration errors, fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
   /// A required setting was not provided.
   #[error("missing required setting: {0}")]
   Missing(&'static str),

   /// A setting has an unusable value.
   #[error("invalid {field}: {reason}")]
   Invalid { field: &'static str, reason: String },

   /// Configuration sources could not be merged.
   #[error("failed to load configuration: {0}")]
   Load(String),
}

/// Space resolution errors, fatal at startup.
#[derive(Debug, Error)]
pub enum SpaceError {
   /// No space with the configured name is visible to the token.
   #[error("no space named {0} is visible to this token")]
   NotFound(String),

   /// More than one space carries the configured name.
   #[error("more than one space named {name}: {ids:?}")]
   Ambiguous { name: String, ids: Vec<String> },

   /// Onezone request failed (includes authentication failures).
   #[error("onezone request failed: {0}")]
   Http(#[from] reqwest::Error),

   /// Onezone answered with a non-success status.
   #[error("onezone answered {status} for {url}")]
   Status { url: String, status: u16 },
}

/// Standard result type using [`enum@Error`] as the default error type
pub type Result<T, E = Error> = std::result::Result<T, E>;
