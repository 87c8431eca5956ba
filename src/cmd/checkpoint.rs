//! Checkpoint inspection and override commands.

use std::{fs, path::Path};

use chrono::{DateTime, SecondsFormat, Utc};
use console::style;
use serde::Serialize;

use crate::{Result, checkpoint::CheckpointStore, config::Config, types::Seq};

#[derive(Serialize)]
struct SlotReport {
   name:     String,
   seq:      Option<Seq>,
   modified: Option<String>,
}

fn modified(path: &Path) -> Option<String> {
   let time = fs::metadata(path).and_then(|m| m.modified()).ok()?;
   Some(DateTime::<Utc>::from(time).to_rfc3339_opts(SecondsFormat::Secs, true))
}

#[derive(Serialize)]
struct ShowReport {
   dir:    String,
   resume: Option<Seq>,
   slots:  Vec<SlotReport>,
}

/// Prints the slot files and the resume point they produce.
pub fn show(cfg: &Config, json: bool) -> Result<()> {
   let store = CheckpointStore::open(&cfg.checkpoint_dir)?;
   let files = store.list()?;
   let resume = files.iter().filter_map(|f| f.seq).min();

   if json {
      let report = ShowReport {
         dir: store.dir().display().to_string(),
         resume,
         slots: files
            .into_iter()
            .map(|f| SlotReport { modified: modified(&f.path), name: f.name, seq: f.seq })
            .collect(),
      };
      println!("{}", serde_json::to_string_pretty(&report)?);
      return Ok(());
   }

   println!("{} {}", style("Checkpoint directory:").bold(), store.dir().display());
   if files.is_empty() {
      println!("{}", style("No checkpoint files").dim());
   }
   for file in &files {
      let when = modified(&file.path).unwrap_or_default();
      match file.seq {
         Some(seq) => {
            println!("  {} {} {} {}", style("●").green(), file.name, seq, style(when).dim());
         },
         None => println!("  {} {} {}", style("●").yellow(), file.name, style("(unreadable)").dim()),
      }
   }
   match resume {
      Some(seq) => println!("{} after seq {}", style("Resume:").bold(), style(seq).cyan()),
      None => println!("{} from the feed's default position", style("Resume:").bold()),
   }
   Ok(())
}

/// Replaces every slot file with a single floor at `seq`.
pub fn set(cfg: &Config, seq: Seq) -> Result<()> {
   let store = CheckpointStore::open(&cfg.checkpoint_dir)?;
   let before = store.load()?;
   store.reset_floor(Some(seq))?;
   println!(
      "{} {} -> {}",
      style("Checkpoint set:").green().bold(),
      before.map_or_else(|| "none".to_string(), |s| s.to_string()),
      seq
   );
   Ok(())
}
