//! Checkpoint directory: one `<slot>.seq` text file per worker slot.
//!
//! Each file holds the decimal sequence number last saved for that slot.
//! The resume point is the minimum over every parseable file, which also
//! covers directories left behind by a run with a different worker count.

use std::{
   fs, io,
   path::{Path, PathBuf},
};

use crate::{
   Result,
   error::CheckpointError,
   types::Seq,
   util::{fsync_dir, write_atomic},
};

const SLOT_EXTENSION: &str = "seq";

/// A slot file found in the checkpoint directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotFile {
   pub name: String,
   pub path: PathBuf,
   /// `None` when the file is empty or does not hold a number.
   pub seq:  Option<Seq>,
}

#[derive(Debug, Clone)]
pub struct CheckpointStore {
   dir: PathBuf,
}

impl CheckpointStore {
   /// Opens the directory, creating it if needed.
   pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
      let dir = dir.into();
      fs::create_dir_all(&dir).map_err(|e| io_err("create", &dir, e))?;
      Ok(Self { dir })
   }

   pub fn dir(&self) -> &Path {
      &self.dir
   }

   pub fn slot_path(&self, index: usize) -> PathBuf {
      self.dir.join(format!("{index}.{SLOT_EXTENSION}"))
   }

   /// Lists slot files sorted by name. Unreadable or malformed files are
   /// reported with `seq: None` rather than failing the listing.
   pub fn list(&self) -> Result<Vec<SlotFile>> {
      let entries = fs::read_dir(&self.dir).map_err(|e| io_err("list", &self.dir, e))?;
      let mut files = Vec::new();
      for entry in entries {
         let entry = entry.map_err(|e| io_err("list", &self.dir, e))?;
         let path = entry.path();
         let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_owned) else {
            continue;
         };
         if name.starts_with('.') || !path.is_file() {
            continue;
         }
         if path.extension().and_then(|e| e.to_str()) != Some(SLOT_EXTENSION) {
            continue;
         }
         let seq = match fs::read_to_string(&path) {
            Ok(raw) => raw.trim().parse::<Seq>().ok(),
            Err(e) => {
               tracing::warn!("ignoring unreadable checkpoint file {}: {}", path.display(), e);
               None
            },
         };
         if seq.is_none() {
            tracing::debug!("checkpoint file {} holds no sequence number", path.display());
         }
         files.push(SlotFile { name, path, seq });
      }
      files.sort_by(|a, b| a.name.cmp(&b.name));
      Ok(files)
   }

   /// Minimum over every parseable slot file, or `None` when nothing usable
   /// was found.
   pub fn load(&self) -> Result<Option<Seq>> {
      Ok(self.list()?.iter().filter_map(|f| f.seq).min())
   }

   /// Collapses the directory to a single floor file.
   ///
   /// `0.seq` is written first (when a floor is known) and the other slot
   /// files are removed afterwards, so a crash in between only leaves extra
   /// files that are at or above the floor. Without a floor every slot file
   /// goes.
   pub fn reset_floor(&self, floor: Option<Seq>) -> Result<()> {
      if let Some(seq) = floor {
         self.write_slot(0, seq)?;
      }
      let keep = floor.map(|_| self.slot_path(0));
      for file in self.list()? {
         if keep.as_ref() == Some(&file.path) {
            continue;
         }
         fs::remove_file(&file.path).map_err(|e| io_err("remove", &file.path, e))?;
      }
      fsync_dir(&self.dir)?;
      Ok(())
   }

   /// Atomically replaces the content of one slot file.
   pub fn write_slot(&self, index: usize, seq: Seq) -> Result<()> {
      write_atomic(&self.slot_path(index), seq.to_string().as_bytes())
   }

   /// Writes one file per slot. Slot files only ever move up, so a crash
   /// part-way leaves older values that are still safe to resume from.
   pub fn save(&self, slots: &[Seq]) -> Result<()> {
      for (index, seq) in slots.iter().enumerate() {
         self.write_slot(index, *seq)?;
      }
      Ok(())
   }
}

fn io_err(op: &'static str, path: &Path, source: io::Error) -> CheckpointError {
   CheckpointError::Io { op, path: path.display().to_string(), source }
}
