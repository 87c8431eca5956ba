//! Run command.
//!
//! Resolves the space, builds the feed and file store for the configured
//! deployment and runs the orchestrator until a shutdown signal arrives.

use std::sync::Arc;

use console::style;
use tokio::signal;
use tokio_util::sync::CancellationToken;

use crate::{
   Result,
   config::Config,
   error::ConfigError,
   extract::JsonExtractor,
   feed::HttpChangeFeed,
   http,
   orchestrator::{Collaborators, Orchestrator, RunSettings},
   space,
   store::{FileStore, LocalFileStore, RestFileStore},
};

/// Executes the run command.
pub async fn execute(cfg: Config) -> Result<()> {
   cfg.validate()?;
   let token = cfg.token.as_deref().ok_or(ConfigError::Missing("token"))?;
   let provider = cfg.provider_host.as_deref().ok_or(ConfigError::Missing("provider_host"))?;
   let client = http::client(token, cfg.insecure)?;

   let space_id = match (&cfg.space_id, &cfg.space_name, &cfg.onezone_host) {
      (Some(id), ..) => id.clone(),
      (None, Some(name), Some(zone)) => space::resolve_space_id(&client, zone, name).await?,
      (None, None, _) => return Err(ConfigError::Missing("space_name or space_id").into()),
      (None, Some(_), None) => return Err(ConfigError::Missing("onezone_host").into()),
   };
   tracing::info!(space_id = %space_id, provider, "space resolved");

   let store: Arc<dyn FileStore> = match &cfg.mount_root {
      Some(root) => Arc::new(LocalFileStore::new(root)),
      None => Arc::new(RestFileStore::new(client.clone(), provider)?),
   };
   let collab = Collaborators {
      feed: Arc::new(HttpChangeFeed::new(client, provider, &space_id, cfg.feed_timeout_ms)),
      store,
      extractor: Arc::new(JsonExtractor),
   };

   let shutdown = CancellationToken::new();
   tokio::spawn(watch_signals(shutdown.clone()));

   let mut orchestrator = Orchestrator::new(RunSettings::from_config(&cfg), collab);
   let report = orchestrator.run(shutdown).await?;

   eprintln!(
      "{} {} tagged, {} skipped, {} failed; resume point {}",
      style("Stopped:").bold(),
      report.workers.tagged,
      report.workers.skipped,
      report.workers.failed,
      report
         .final_flush
         .seq()
         .map_or_else(|| "unchanged".to_string(), |s| s.to_string())
   );
   Ok(())
}

async fn watch_signals(shutdown: CancellationToken) {
   #[cfg(unix)]
   let terminate = async {
      match signal::unix::signal(signal::unix::SignalKind::terminate()) {
         Ok(mut sig) => {
            sig.recv().await;
         },
         Err(e) => {
            tracing::warn!("cannot listen for SIGTERM: {e}");
            std::future::pending::<()>().await;
         },
      }
   };
   #[cfg(not(unix))]
   let terminate = std::future::pending::<()>();

   tokio::select! {
      _ = signal::ctrl_c() => {},
      () = terminate => {},
   }
   eprintln!("\n{}", style("Shutting down...").yellow());
   shutdown.cancel();
}
