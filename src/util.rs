//! Utility functions for durable file writes and timing

use std::{
   fs::{self, File},
   io::Write,
   path::{Path, PathBuf},
   time::Duration,
};

use crate::{Result, error::Error};

/// Flushes directory metadata so a preceding rename survives a crash.
#[cfg(unix)]
pub fn fsync_dir(dir: &Path) -> Result<()> {
   File::open(dir)?.sync_all()?;
   Ok(())
}

#[cfg(not(unix))]
pub fn fsync_dir(_dir: &Path) -> Result<()> {
   Ok(())
}

/// Writes `data` next to `path`, syncs it, then renames it over `path`.
///
/// Readers see either the old content or the new content, never a partial
/// write.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
   let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
   if let Some(parent) = parent {
      fs::create_dir_all(parent)?;
   }
   let tmp_path = temp_path(path)?;
   {
      let mut file = File::create(&tmp_path)?;
      file.write_all(data)?;
      file.sync_all()?;
   }
   fail_point("write_atomic.before_rename")?;
   fs::rename(&tmp_path, path)?;
   if let Some(parent) = parent {
      fsync_dir(parent)?;
   }
   Ok(())
}

fn temp_path(path: &Path) -> Result<PathBuf> {
   let name = path
      .file_name()
      .and_then(|n| n.to_str())
      .ok_or_else(|| Error::Io(std::io::Error::other(format!("invalid path {}", path.display()))))?;
   Ok(path.with_file_name(format!(".{name}.tmp")))
}

#[cfg(feature = "failpoints")]
pub fn fail_point(name: &str) -> Result<()> {
   fail::fail_point!(name, |_| Err(Error::FailPoint(name.to_string())));
   Ok(())
}

#[cfg(not(feature = "failpoints"))]
#[inline]
pub fn fail_point(_name: &str) -> Result<()> {
   Ok(())
}

/// Milliseconds with sub-millisecond precision, for log fields.
pub fn millis(d: Duration) -> f64 {
   d.as_secs_f64() * 1000.0
}
