//! Configuration loaded from defaults, an optional TOML file, environment
//! variables and command-line overrides.

use std::{
   path::{Path, PathBuf},
   time::Duration,
};

use figment::{
   Figment,
   providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::{
   error::{ConfigError, Result},
   feed::FeedFilter,
};

pub const DEFAULT_CONFIG_FILE: &str = "changetag.toml";
pub const ENV_PREFIX: &str = "CHANGETAG_";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
   pub onezone_host:  Option<String>,
   pub provider_host: Option<String>,
   pub space_name:    Option<String>,
   pub space_id:      Option<String>,
   pub token:         Option<String>,
   pub insecure:      bool,

   pub workers:            usize,
   pub queue_capacity:     usize,
   pub flush_interval_ms:  u64,
   pub start_seq:          Option<u64>,
   pub path_suffix:        String,
   pub checkpoint_dir:     PathBuf,
   pub feed_timeout_ms:    u64,
   pub reconnect_delay_ms: u64,
   pub drain_timeout_ms:   u64,
   pub attribute_key:      String,
   pub mount_root:         Option<PathBuf>,
}

impl Default for Config {
   fn default() -> Self {
      Self {
         onezone_host: None,
         provider_host: None,
         space_name: None,
         space_id: None,
         token: None,
         insecure: false,
         workers: 3,
         queue_capacity: 1_000_000,
         flush_interval_ms: 2000,
         start_seq: None,
         path_suffix: ".json".to_string(),
         checkpoint_dir: PathBuf::from("./persistence/state"),
         feed_timeout_ms: 60_000,
         reconnect_delay_ms: 1000,
         drain_timeout_ms: 30_000,
         attribute_key: "onedata_json".to_string(),
         mount_root: None,
      }
   }
}

/// Values supplied on the command line. Unset fields leave the lower layers
/// untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfigOverrides {
   #[serde(skip_serializing_if = "Option::is_none")]
   pub onezone_host:   Option<String>,
   #[serde(skip_serializing_if = "Option::is_none")]
   pub provider_host:  Option<String>,
   #[serde(skip_serializing_if = "Option::is_none")]
   pub space_name:     Option<String>,
   #[serde(skip_serializing_if = "Option::is_none")]
   pub space_id:       Option<String>,
   #[serde(skip_serializing_if = "Option::is_none")]
   pub token:          Option<String>,
   #[serde(skip_serializing_if = "Option::is_none")]
   pub insecure:       Option<bool>,
   #[serde(skip_serializing_if = "Option::is_none")]
   pub workers:        Option<usize>,
   #[serde(skip_serializing_if = "Option::is_none")]
   pub queue_capacity: Option<usize>,
   #[serde(skip_serializing_if = "Option::is_none")]
   pub start_seq:      Option<u64>,
   #[serde(skip_serializing_if = "Option::is_none")]
   pub path_suffix:    Option<String>,
   #[serde(skip_serializing_if = "Option::is_none")]
   pub checkpoint_dir: Option<PathBuf>,
   #[serde(skip_serializing_if = "Option::is_none")]
   pub mount_root:     Option<PathBuf>,
}

impl Config {
   /// Layers defaults, the TOML file, `CHANGETAG_*` variables and the CLI
   /// overrides, in that order.
   pub fn load(config_path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
      let mut figment = Figment::from(Serialized::defaults(Self::default()));

      match config_path {
         Some(path) => figment = figment.merge(Toml::file_exact(path)),
         None => {
            let default_path = Path::new(DEFAULT_CONFIG_FILE);
            if default_path.exists() {
               figment = figment.merge(Toml::file(default_path));
            }
         },
      }

      figment
         .merge(Env::prefixed(ENV_PREFIX).lowercase(true))
         .merge(Serialized::defaults(overrides))
         .extract()
         .map_err(|e| ConfigError::Load(e.to_string()).into())
   }

   pub fn validate(&self) -> Result<()> {
      if self.workers == 0 {
         return Err(
            ConfigError::Invalid { field: "workers", reason: "must be at least 1".to_string() }
               .into(),
         );
      }
      if self.queue_capacity == 0 {
         return Err(
            ConfigError::Invalid {
               field:  "queue_capacity",
               reason: "must be at least 1".to_string(),
            }
            .into(),
         );
      }
      if self.flush_interval_ms == 0 {
         return Err(
            ConfigError::Invalid {
               field:  "flush_interval_ms",
               reason: "must be greater than zero".to_string(),
            }
            .into(),
         );
      }
      if self.path_suffix.is_empty() {
         return Err(
            ConfigError::Invalid {
               field:  "path_suffix",
               reason: "must not be empty".to_string(),
            }
            .into(),
         );
      }
      if self.provider_host.is_none() {
         return Err(ConfigError::Missing("provider_host").into());
      }
      if self.token.is_none() {
         return Err(ConfigError::Missing("token").into());
      }
      if self.space_id.is_none() {
         if self.space_name.is_none() {
            return Err(ConfigError::Missing("space_name or space_id").into());
         }
         if self.onezone_host.is_none() {
            return Err(ConfigError::Missing("onezone_host").into());
         }
      }
      Ok(())
   }

   pub fn feed_filter(&self) -> FeedFilter {
      FeedFilter::new(&self.path_suffix)
   }

   pub const fn flush_interval(&self) -> Duration {
      Duration::from_millis(self.flush_interval_ms)
   }

   pub const fn reconnect_delay(&self) -> Duration {
      Duration::from_millis(self.reconnect_delay_ms)
   }

   pub const fn drain_timeout(&self) -> Duration {
      Duration::from_millis(self.drain_timeout_ms)
   }

   /// Copy suitable for printing, with the token masked.
   pub fn redacted(&self) -> Self {
      let mut cfg = self.clone();
      if cfg.token.is_some() {
         cfg.token = Some("<redacted>".to_string());
      }
      cfg
   }
}
