//! CLI command implementations for changetag.
//!
//! Each module corresponds to one subcommand.

pub mod checkpoint;
pub mod config;
pub mod run;
