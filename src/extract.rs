//! Metadata extraction from opened files.

use serde_json::Value;
use tokio::io::AsyncReadExt;

use crate::{error::ExtractError, store::FileHandle};

/// Turns file content into the document stored on the file.
#[async_trait::async_trait]
pub trait Extractor: Send + Sync {
   async fn extract(&self, handle: &mut FileHandle) -> Result<Value, ExtractError>;
}

/// Treats the file itself as a JSON document.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonExtractor;

#[async_trait::async_trait]
impl Extractor for JsonExtractor {
   async fn extract(&self, handle: &mut FileHandle) -> Result<Value, ExtractError> {
      let mut buf = Vec::new();
      handle
         .reader()
         .read_to_end(&mut buf)
         .await
         .map_err(|source| ExtractError::Read { path: handle.path().to_string(), source })?;
      serde_json::from_slice(&buf)
         .map_err(|e| ExtractError::Parse { path: handle.path().to_string(), reason: e.to_string() })
   }
}
