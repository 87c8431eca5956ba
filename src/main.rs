use std::path::PathBuf;

use changetag::{
   Result,
   cmd,
   config::{Config, ConfigOverrides},
};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "changetag=info";

/// Command-line arguments for changetag
#[derive(Parser)]
#[command(name = "changetag")]
#[command(about = "Tag files from a Onedata change feed with extracted metadata")]
#[command(version)]
struct Cli {
   #[arg(long, global = true, env = "CHANGETAG_CONFIG", help = "Path to a TOML config file")]
   config: Option<PathBuf>,

   #[arg(long, global = true, help = "Emit logs as JSON lines")]
   log_json: bool,

   #[command(flatten)]
   overrides: OverrideArgs,

   #[command(subcommand)]
   command: Option<Cmd>,
}

/// Settings that may also come from the environment names used by existing
/// deployments.
#[derive(Args)]
struct OverrideArgs {
   #[arg(long, global = true, env = "ONEZONE_HOST")]
   onezone_host: Option<String>,

   #[arg(long, global = true, env = "ONECLIENT_PROVIDER_HOST")]
   provider_host: Option<String>,

   #[arg(long, global = true, env = "SPACE_NAME")]
   space_name: Option<String>,

   #[arg(long, global = true)]
   space_id: Option<String>,

   #[arg(long, global = true, env = "ONECLIENT_ACCESS_TOKEN", hide_env_values = true)]
   token: Option<String>,

   #[arg(
      long,
      global = true,
      env = "ONECLIENT_INSECURE",
      value_parser = clap::builder::BoolishValueParser::new(),
      help = "Skip TLS verification"
   )]
   insecure: Option<bool>,

   #[arg(long, global = true, help = "Number of workers")]
   workers: Option<usize>,

   #[arg(long, global = true, help = "Work queue capacity")]
   queue_capacity: Option<usize>,

   #[arg(
      long,
      global = true,
      env = "LAST_SEQUENCE",
      help = "Resume after this seq, ignoring the checkpoint"
   )]
   start_seq: Option<u64>,

   #[arg(long, global = true, help = "Only process paths ending with this suffix")]
   path_suffix: Option<String>,

   #[arg(long, global = true)]
   checkpoint_dir: Option<PathBuf>,

   #[arg(long, global = true, help = "Tag files under this local mount instead of over REST")]
   mount_root: Option<PathBuf>,
}

impl From<OverrideArgs> for ConfigOverrides {
   fn from(a: OverrideArgs) -> Self {
      Self {
         onezone_host:   a.onezone_host,
         provider_host:  a.provider_host,
         space_name:     a.space_name,
         space_id:       a.space_id,
         token:          a.token,
         insecure:       a.insecure,
         workers:        a.workers,
         queue_capacity: a.queue_capacity,
         start_seq:      a.start_seq,
         path_suffix:    a.path_suffix,
         checkpoint_dir: a.checkpoint_dir,
         mount_root:     a.mount_root,
      }
   }
}

/// Available subcommands for changetag
#[derive(Subcommand)]
enum Cmd {
   #[command(about = "Consume the change feed and tag files (default)")]
   Run,

   #[command(about = "Inspect or override the saved checkpoint")]
   Checkpoint {
      #[command(subcommand)]
      action: CheckpointCmd,
   },

   #[command(about = "Print the effective configuration")]
   Config,
}

#[derive(Subcommand)]
enum CheckpointCmd {
   #[command(about = "Show slot files and the resume point")]
   Show {
      #[arg(long, help = "JSON output")]
      json: bool,
   },

   #[command(about = "Replace the checkpoint with a single sequence number")]
   Set {
      #[arg(help = "Sequence number to resume after")]
      seq: u64,
   },
}

#[tokio::main]
async fn main() {
   let cli = Cli::parse();
   init_tracing(cli.log_json);

   if let Err(err) = run(cli).await {
      eprintln!("{err}");
      std::process::exit(err.exit_code());
   }
}

fn init_tracing(json: bool) {
   let filter =
      EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
   let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
   if json {
      builder.json().init();
   } else {
      builder.init();
   }
}

async fn run(cli: Cli) -> Result<()> {
   let overrides = ConfigOverrides::from(cli.overrides);
   let cfg = Config::load(cli.config.as_deref(), &overrides)?;

   match cli.command.unwrap_or(Cmd::Run) {
      Cmd::Run => cmd::run::execute(cfg).await,
      Cmd::Checkpoint { action: CheckpointCmd::Show { json } } => cmd::checkpoint::show(&cfg, json),
      Cmd::Checkpoint { action: CheckpointCmd::Set { seq } } => cmd::checkpoint::set(&cfg, seq),
      Cmd::Config => cmd::config::execute(&cfg),
   }
}
