mod logging;

use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use banana_contracts::events::EventWriter;
use banana_engine::{EngineConfig, ImageTools, Server, TransportOptions, DEFAULT_OUTPUT_DIR};
use clap::Parser;
use tracing::info;

use crate::logging::{init_logging, Verbosity};

#[derive(Debug, Parser)]
#[command(
    name = "nano-banana-mcp",
    version,
    about = "MCP stdio server for Gemini image generation and editing"
)]
struct Cli {
    /// Directory generated and edited images are written to.
    #[arg(default_value = DEFAULT_OUTPUT_DIR)]
    output_dir: PathBuf,
    /// Image model; `dryrun-image-1` works offline.
    #[arg(long, env = "NANO_BANANA_MODEL")]
    model: Option<String>,
    /// Append a JSONL audit log of tool calls to this file.
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long, default_value_t = 90.0)]
    request_timeout: f64,
    #[arg(long, default_value_t = 0)]
    transport_retries: usize,
    #[arg(long, default_value_t = 1.2)]
    retry_backoff: f64,
    #[arg(short, long, action = clap::ArgAction::Count, conflicts_with = "quiet")]
    verbose: u8,
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    fn engine_config(&self) -> EngineConfig {
        EngineConfig::new(&self.output_dir)
            .with_model(self.model.clone())
            .with_transport(TransportOptions {
                request_timeout_s: self.request_timeout,
                retries: self.transport_retries,
                retry_backoff_s: self.retry_backoff,
            })
    }
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = init_logging(Verbosity::from_flags(cli.quiet, cli.verbose)) {
        eprintln!("nano-banana-mcp: logging not initialised: {err}");
    }
    if let Err(err) = run(cli) {
        eprintln!("nano-banana-mcp error: {err:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = cli.engine_config();
    let tools = ImageTools::from_config(&config).context("failed to initialise image tools")?;
    info!(
        model = %tools.model().name,
        provider = %tools.model().provider,
        output_dir = %config.output_dir.display(),
        "image tools ready"
    );

    let mut server = Server::new(tools);
    if let Some(path) = cli.events {
        let session_id = uuid::Uuid::new_v4().to_string();
        info!(events = %path.display(), session_id = %session_id, "recording tool events");
        server = server.with_events(EventWriter::open(path, session_id)?);
    }

    let stdin = io::stdin();
    let stdout = io::stdout();
    server
        .serve(stdin.lock(), stdout.lock())
        .context("server error")
}
