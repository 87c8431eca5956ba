//! Newline framing for the change feed body.
//!
//! Lines are handed out as raw bytes. Invalid UTF-8 is left for the record
//! parser to reject, and an over-long line is discarded up to its newline,
//! so neither one breaks the connection.

use std::io;

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::Decoder;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedLine {
   /// One line without its `\n` (or `\r\n`) terminator.
   Record(Bytes),
   /// A line longer than the limit was dropped; carries its length.
   TooLong(usize),
}

#[derive(Debug)]
pub struct FeedLineCodec {
   max_length: usize,
   /// Bytes already searched for a newline.
   scanned:    usize,
   /// Bytes dropped so far from an over-long line.
   discarding: Option<usize>,
}

impl FeedLineCodec {
   pub const fn new(max_length: usize) -> Self {
      Self { max_length, scanned: 0, discarding: None }
   }
}

fn without_cr(mut line: BytesMut) -> Bytes {
   if line.last() == Some(&b'\r') {
      line.truncate(line.len() - 1);
   }
   line.freeze()
}

impl Decoder for FeedLineCodec {
   type Item = FeedLine;
   type Error = io::Error;

   fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<FeedLine>, io::Error> {
      let newline = buf[self.scanned..]
         .iter()
         .position(|b| *b == b'\n')
         .map(|i| self.scanned + i);

      if let Some(skipped) = self.discarding {
         self.scanned = 0;
         return Ok(match newline {
            Some(at) => {
               buf.advance(at + 1);
               self.discarding = None;
               Some(FeedLine::TooLong(skipped + at))
            },
            None => {
               let len = buf.len();
               buf.advance(len);
               self.discarding = Some(skipped + len);
               None
            },
         });
      }

      match newline {
         Some(at) if at <= self.max_length => {
            let mut line = buf.split_to(at + 1);
            line.truncate(at);
            self.scanned = 0;
            Ok(Some(FeedLine::Record(without_cr(line))))
         },
         Some(at) => {
            buf.advance(at + 1);
            self.scanned = 0;
            Ok(Some(FeedLine::TooLong(at)))
         },
         None if buf.len() > self.max_length => {
            let len = buf.len();
            buf.advance(len);
            self.scanned = 0;
            self.discarding = Some(len);
            Ok(None)
         },
         None => {
            self.scanned = buf.len();
            Ok(None)
         },
      }
   }

   fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<FeedLine>, io::Error> {
      if let Some(line) = self.decode(buf)? {
         return Ok(Some(line));
      }
      if let Some(skipped) = self.discarding.take() {
         return Ok(Some(FeedLine::TooLong(skipped)));
      }
      if buf.is_empty() {
         return Ok(None);
      }
      self.scanned = 0;
      Ok(Some(FeedLine::Record(without_cr(buf.split()))))
   }
}
