//! Prints the effective configuration.

use crate::{Result, config::Config};

pub fn execute(cfg: &Config) -> Result<()> {
   print!("{}", toml::to_string_pretty(&cfg.redacted())?);
   Ok(())
}
