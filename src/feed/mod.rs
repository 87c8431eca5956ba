//! Change feed access and the reader task that fills the work queue.

pub mod http;
pub mod lines;
pub mod reader;

use bytes::Bytes;
use futures::stream::BoxStream;

pub use http::HttpChangeFeed;
pub use lines::{FeedLine, FeedLineCodec};
pub use reader::{FeedFilter, FeedReader, ReaderStats};

use crate::{error::FeedError, types::Seq};

/// Raw lines from one feed connection, as bytes. The stream ends when the
/// provider closes the connection. `FeedError::LineTooLong` items stand for
/// a single dropped line and the stream goes on after them.
pub type FeedStream = BoxStream<'static, Result<Bytes, FeedError>>;

/// Connects to a change feed at a resume position.
#[async_trait::async_trait]
pub trait ChangeFeed: Send + Sync {
   /// Opens a connection that yields events strictly after `last_seq`, or
   /// from the feed's default start when `None`.
   async fn connect(&self, last_seq: Option<Seq>) -> Result<FeedStream, FeedError>;
}
