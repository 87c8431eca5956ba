//! Crash-safe checkpointing of the lowest fully processed sequence number.

pub mod flusher;
pub mod slots;
pub mod store;

pub use flusher::{FlushOutcome, Flusher};
pub use slots::{SlotTable, Watermark};
pub use store::{CheckpointStore, SlotFile};
