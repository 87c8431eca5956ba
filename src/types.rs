//! Change records as they arrive on the feed and as they travel through the
//! work queue.

use serde::Deserialize;
use serde_json::Value;

use crate::error::RecordError;

/// Position in the change feed.
pub type Seq = u64;

/// One mutation event from the change feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
   pub seq:       Seq,
   pub file_path: Option<String>,
   pub changed:   bool,
   pub deleted:   bool,
}

/// A change event that passed the filter and waits for a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
   pub seq:       Seq,
   pub file_path: String,
}

#[derive(Deserialize)]
struct RawRecord {
   #[serde(default)]
   seq:       Option<Value>,
   #[serde(default, rename = "filePath", alias = "file_path")]
   file_path: Option<Value>,
   #[serde(default, rename = "fileMeta")]
   file_meta: Option<RawFileMeta>,
   #[serde(default)]
   deleted:   Option<Value>,
}

#[derive(Deserialize)]
struct RawFileMeta {
   #[serde(default)]
   changed: Option<Value>,
   #[serde(default)]
   deleted: Option<Value>,
}

impl ChangeEvent {
   /// Parses one feed line.
   ///
   /// Only `seq` is mandatory. Any other field that is missing or has the
   /// wrong type falls back to a value that keeps the event out of the
   /// queue, so a well-sequenced but odd record still advances the cursor.
   pub fn parse(line: impl AsRef<[u8]>) -> Result<Self, RecordError> {
      let raw: RawRecord = serde_json::from_slice(line.as_ref()).map_err(RecordError::Json)?;
      let seq = raw
         .seq
         .and_then(|v| v.as_u64())
         .ok_or(RecordError::MissingSeq)?;
      let file_path = raw
         .file_path
         .and_then(|v| v.as_str().map(str::to_owned))
         .filter(|p| !p.is_empty());

      let (changed, meta_deleted) = match raw.file_meta {
         Some(meta) => (
            meta.changed.and_then(|v| v.as_bool()).unwrap_or(false),
            meta.deleted.and_then(|v| v.as_bool()),
         ),
         None => (false, None),
      };
      let deleted = meta_deleted
         .or_else(|| raw.deleted.and_then(|v| v.as_bool()))
         .unwrap_or(false);

      Ok(Self { seq, file_path, changed, deleted })
   }

   /// Turns the event into a queue item when it is a live change to a path
   /// accepted by `accept`.
   pub fn into_work_item(self, accept: impl Fn(&str) -> bool) -> Option<WorkItem> {
      if !self.changed || self.deleted {
         return None;
      }
      let file_path = self.file_path?;
      accept(&file_path).then_some(WorkItem { seq: self.seq, file_path })
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn parses_provider_record() {
      let line = r#"{"seq": 6680, "filePath": "/space/a.json", "fileMeta": {"changed": true, "deleted": false, "name": "a.json"}}"#;
      let event = ChangeEvent::parse(line).expect("parse");
      assert_eq!(event, ChangeEvent {
         seq:       6680,
         file_path: Some("/space/a.json".to_string()),
         changed:   true,
         deleted:   false,
      });
   }

   #[test]
   fn missing_seq_is_rejected() {
      let err = ChangeEvent::parse(r#"{"filePath": "/x.json"}"#).expect_err("no seq");
      assert!(matches!(err, RecordError::MissingSeq));
   }

   #[test]
   fn non_integer_seq_is_rejected() {
      let err = ChangeEvent::parse(r#"{"seq": "12"}"#).expect_err("string seq");
      assert!(matches!(err, RecordError::MissingSeq));
      let err = ChangeEvent::parse(r#"{"seq": -4}"#).expect_err("negative seq");
      assert!(matches!(err, RecordError::MissingSeq));
   }

   #[test]
   fn garbage_is_json_error() {
      let err = ChangeEvent::parse("{not json").expect_err("garbage");
      assert!(matches!(err, RecordError::Json(_)));
   }

   #[test]
   fn odd_fields_fall_back_but_keep_seq() {
      let event =
         ChangeEvent::parse(r#"{"seq": 9, "filePath": 17, "fileMeta": {"changed": "yes"}}"#)
            .expect("parse");
      assert_eq!(event.seq, 9);
      assert_eq!(event.file_path, None);
      assert!(!event.changed);
   }

   #[test]
   fn legacy_field_names_accepted() {
      let event = ChangeEvent::parse(
         r#"{"seq": 3, "file_path": "/s/b.json", "deleted": true, "fileMeta": {"changed": true}}"#,
      )
      .expect("parse");
      assert_eq!(event.file_path.as_deref(), Some("/s/b.json"));
      assert!(event.deleted);
   }

   #[test]
   fn filter_requires_live_change_and_match() {
      let accept = |p: &str| p.ends_with(".json");
      let base = ChangeEvent {
         seq:       4,
         file_path: Some("/s/c.json".to_string()),
         changed:   true,
         deleted:   false,
      };
      assert_eq!(
         base.clone().into_work_item(accept),
         Some(WorkItem { seq: 4, file_path: "/s/c.json".to_string() })
      );
      assert_eq!(ChangeEvent { deleted: true, ..base.clone() }.into_work_item(accept), None);
      assert_eq!(ChangeEvent { changed: false, ..base.clone() }.into_work_item(accept), None);
      assert_eq!(
         ChangeEvent { file_path: Some("/s/c.txt".to_string()), ..base }.into_work_item(accept),
         None
      );
   }
}
