//! Files under a local mount point, e.g. a oneclient mount of the zone.
//!
//! Attributes live in a hidden sidecar next to each file,
//! `.<name>.attrs`, holding a JSON object of key to value. The sidecar name
//! never carries the file's own extension so tagging a file does not
//! produce a new feed event that passes the suffix filter.

use std::{
   collections::BTreeMap,
   path::{Component, Path, PathBuf},
   sync::Arc,
};

use parking_lot::Mutex;
use serde_json::Value;

use crate::{
   error::StoreError,
   store::{FileHandle, FileStore},
   util,
};

type AttrMap = BTreeMap<String, Value>;

pub struct LocalFileStore {
   root:  PathBuf,
   /// Serializes sidecar read-modify-write cycles.
   attrs: Arc<Mutex<()>>,
}

impl LocalFileStore {
   pub fn new(root: impl Into<PathBuf>) -> Self {
      Self { root: root.into(), attrs: Arc::new(Mutex::new(())) }
   }

   pub fn root(&self) -> &Path {
      &self.root
   }

   /// Maps a feed path onto the mount, refusing anything that would leave
   /// it.
   pub fn resolve(&self, path: &str) -> Result<PathBuf, StoreError> {
      let mut out = self.root.clone();
      let mut parts = 0usize;
      for component in Path::new(path).components() {
         match component {
            Component::RootDir | Component::CurDir => {},
            Component::Normal(part) => {
               out.push(part);
               parts += 1;
            },
            Component::ParentDir | Component::Prefix(_) => {
               return Err(StoreError::InvalidPath(path.to_string()));
            },
         }
      }
      if parts == 0 {
         return Err(StoreError::InvalidPath(path.to_string()));
      }
      Ok(out)
   }

   pub fn sidecar_path(file: &Path) -> Option<PathBuf> {
      let name = file.file_name()?.to_str()?;
      Some(file.with_file_name(format!(".{name}.attrs")))
   }

   fn sidecar_for(&self, path: &str) -> Result<PathBuf, StoreError> {
      let file = self.resolve(path)?;
      Self::sidecar_path(&file).ok_or_else(|| StoreError::InvalidPath(path.to_string()))
   }

   async fn update_attrs(
      &self,
      path: &str,
      key: &str,
      update: impl FnOnce(&mut AttrMap) + Send + 'static,
   ) -> Result<(), StoreError> {
      let sidecar = self.sidecar_for(path)?;
      let lock = Arc::clone(&self.attrs);
      let attr_err = |reason: String| StoreError::Attribute {
         path: path.to_string(),
         key: key.to_string(),
         reason,
      };

      tokio::task::spawn_blocking(move || -> Result<(), String> {
         let _guard = lock.lock();
         let mut attrs = read_attrs(&sidecar)?;
         update(&mut attrs);
         let bytes = serde_json::to_vec_pretty(&attrs).map_err(|e| e.to_string())?;
         util::write_atomic(&sidecar, &bytes).map_err(|e| e.to_string())
      })
      .await
      .map_err(|e| attr_err(e.to_string()))?
      .map_err(attr_err)
   }
}

fn read_attrs(sidecar: &Path) -> Result<AttrMap, String> {
   match std::fs::read(sidecar) {
      Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| e.to_string()),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AttrMap::new()),
      Err(e) => Err(e.to_string()),
   }
}

#[async_trait::async_trait]
impl FileStore for LocalFileStore {
   async fn open(&self, path: &str) -> Result<FileHandle, StoreError> {
      let resolved = self.resolve(path)?;
      let file = tokio::fs::File::open(&resolved).await.map_err(|e| {
         if e.kind() == std::io::ErrorKind::NotFound {
            StoreError::NotFound(path.to_string())
         } else {
            StoreError::InvalidPath(format!("{path}: {e}"))
         }
      })?;
      Ok(FileHandle::new(path, resolved.to_string_lossy(), Box::new(file)))
   }

   async fn size(&self, handle: &mut FileHandle) -> Result<u64, StoreError> {
      let meta = tokio::fs::metadata(handle.id())
         .await
         .map_err(|_| StoreError::NotFound(handle.path().to_string()))?;
      if !meta.is_file() {
         return Err(StoreError::InvalidPath(format!("{} is not a regular file", handle.path())));
      }
      Ok(meta.len())
   }

   async fn set_attribute(&self, path: &str, key: &str, value: &Value) -> Result<(), StoreError> {
      let owned_key = key.to_string();
      let value = value.clone();
      self
         .update_attrs(path, key, move |attrs| {
            attrs.insert(owned_key, value);
         })
         .await
   }

   async fn get_attribute(&self, path: &str, key: &str) -> Result<Option<Value>, StoreError> {
      let sidecar = self.sidecar_for(path)?;
      let bytes = match tokio::fs::read(&sidecar).await {
         Ok(bytes) => bytes,
         Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
         Err(e) => {
            return Err(StoreError::Attribute {
               path:   path.to_string(),
               key:    key.to_string(),
               reason: e.to_string(),
            });
         },
      };
      let mut attrs: AttrMap =
         serde_json::from_slice(&bytes).map_err(|e| StoreError::Attribute {
            path:   path.to_string(),
            key:    key.to_string(),
            reason: e.to_string(),
         })?;
      Ok(attrs.remove(key))
   }
}
