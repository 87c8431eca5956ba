//! Oneprovider changes API over a streaming POST.

use std::io;

use futures::{StreamExt, TryStreamExt};
use reqwest::{Client, header::CONTENT_TYPE};
use tokio_util::{codec::FramedRead, io::StreamReader};

use crate::{
   error::FeedError,
   feed::{ChangeFeed, FeedLine, FeedLineCodec, FeedStream},
   http::base_url,
   types::Seq,
};

/// Fields requested from the provider for every change record.
const CHANGES_REQUEST: &str =
   r#"{"fileMeta": {"fields": ["name", "type", "deleted"], "always": true}}"#;

/// Longer lines are dropped as malformed records.
pub const MAX_LINE_BYTES: usize = 1 << 20;

pub struct HttpChangeFeed {
   client:     Client,
   provider:   String,
   space_id:   String,
   timeout_ms: u64,
}

impl HttpChangeFeed {
   pub fn new(client: Client, provider_host: &str, space_id: &str, timeout_ms: u64) -> Self {
      Self {
         client,
         provider: base_url(provider_host),
         space_id: space_id.to_string(),
         timeout_ms,
      }
   }

   pub fn changes_url(&self, last_seq: Option<Seq>) -> String {
      let mut url = format!(
         "{}/api/v3/oneprovider/changes/metadata/{}?timeout={}",
         self.provider, self.space_id, self.timeout_ms
      );
      if let Some(seq) = last_seq {
         url.push_str(&format!("&last_seq={seq}"));
      }
      url
   }
}

#[async_trait::async_trait]
impl ChangeFeed for HttpChangeFeed {
   async fn connect(&self, last_seq: Option<Seq>) -> Result<FeedStream, FeedError> {
      let url = self.changes_url(last_seq);
      tracing::debug!("opening change feed {url}");

      let response = self
         .client
         .post(&url)
         .header(CONTENT_TYPE, "application/json")
         .body(CHANGES_REQUEST)
         .send()
         .await?;

      let status = response.status();
      if !status.is_success() {
         let body = response.text().await.unwrap_or_default();
         return Err(FeedError::Status { status: status.as_u16(), body });
      }

      let body = response.bytes_stream().map_err(io::Error::other);
      let lines = FramedRead::new(StreamReader::new(body), FeedLineCodec::new(MAX_LINE_BYTES))
         .map(|line| match line {
            Ok(FeedLine::Record(bytes)) => Ok(bytes),
            Ok(FeedLine::TooLong(len)) => Err(FeedError::LineTooLong { len }),
            Err(e) => Err(FeedError::Stream(e.to_string())),
         })
         .try_filter(|line| futures::future::ready(!line.trim_ascii().is_empty()));

      Ok(lines.boxed())
   }
}
