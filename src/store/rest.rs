//! Files reached through the Oneprovider REST API.

use futures::TryStreamExt;
use reqwest::{Client, Response, Url, header::CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio_util::io::StreamReader;

use crate::{
   error::StoreError,
   http::base_url,
   store::{FileHandle, FileStore},
};

#[derive(Deserialize)]
struct FileIdResponse {
   #[serde(rename = "fileId")]
   file_id: String,
}

#[derive(Deserialize)]
struct FileAttrs {
   #[serde(default)]
   size: Option<u64>,
}

pub struct RestFileStore {
   client: Client,
   api:    Url,
}

impl RestFileStore {
   pub fn new(client: Client, provider_host: &str) -> Result<Self, StoreError> {
      let raw = format!("{}/api/v3/oneprovider", base_url(provider_host));
      let api = Url::parse(&raw).map_err(|e| StoreError::InvalidPath(format!("{raw}: {e}")))?;
      if api.cannot_be_a_base() {
         return Err(StoreError::InvalidPath(raw));
      }
      Ok(Self { client, api })
   }

   /// Appends `segments` to the API root. Every segment is percent-encoded,
   /// so `/`, `#`, `?` and `%` inside a segment never change the URL shape.
   fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Url {
      let mut url = self.api.clone();
      if let Ok(mut path) = url.path_segments_mut() {
         path.pop_if_empty().extend(segments);
      }
      url
   }

   /// `path` is split on `/` and each non-empty component becomes one
   /// segment.
   pub fn lookup_url(&self, path: &str) -> Url {
      let parts = path.split('/').filter(|s| !s.is_empty());
      self.endpoint(std::iter::once("lookup-file-id").chain(parts))
   }

   pub fn data_url(&self, file_id: &str, suffix: &[&str]) -> Url {
      self.endpoint(["data", file_id].into_iter().chain(suffix.iter().copied()))
   }

   async fn file_id(&self, path: &str) -> Result<String, StoreError> {
      let response = self.client.post(self.lookup_url(path)).send().await?;
      if response.status() == reqwest::StatusCode::NOT_FOUND {
         return Err(StoreError::NotFound(path.to_string()));
      }
      let found: FileIdResponse = checked(response, "lookup-file-id")?.json().await?;
      Ok(found.file_id)
   }
}

fn checked(response: Response, op: &'static str) -> Result<Response, StoreError> {
   let status = response.status();
   if status.is_success() {
      Ok(response)
   } else {
      Err(StoreError::Status { op, status: status.as_u16() })
   }
}

#[async_trait::async_trait]
impl FileStore for RestFileStore {
   async fn open(&self, path: &str) -> Result<FileHandle, StoreError> {
      let id = self.file_id(path).await?;
      let response = self.client.get(self.data_url(&id, &["content"])).send().await?;
      let body = checked(response, "download")?
         .bytes_stream()
         .map_err(std::io::Error::other);
      Ok(FileHandle::new(path, id, Box::new(StreamReader::new(Box::pin(body)))))
   }

   async fn size(&self, handle: &mut FileHandle) -> Result<u64, StoreError> {
      let response = self.client.get(self.data_url(handle.id(), &[])).send().await?;
      let attrs: FileAttrs = checked(response, "attributes")?.json().await?;
      Ok(attrs.size.unwrap_or(0))
   }

   async fn set_attribute(&self, path: &str, key: &str, value: &Value) -> Result<(), StoreError> {
      let id = self.file_id(path).await?;
      let mut body = Map::new();
      body.insert(key.to_string(), value.clone());
      let response = self
         .client
         .put(self.data_url(&id, &["metadata", "xattrs"]))
         .header(CONTENT_TYPE, "application/json")
         .json(&body)
         .send()
         .await?;
      checked(response, "set xattr")?;
      Ok(())
   }

   async fn get_attribute(&self, path: &str, key: &str) -> Result<Option<Value>, StoreError> {
      let id = self.file_id(path).await?;
      let response = self
         .client
         .get(self.data_url(&id, &["metadata", "xattrs"]))
         .query(&[("attribute", key)])
         .send()
         .await?;
      if response.status() == reqwest::StatusCode::NOT_FOUND {
         return Ok(None);
      }
      let mut attrs: Map<String, Value> = checked(response, "get xattr")?.json().await?;
      Ok(attrs.remove(key))
   }
}
