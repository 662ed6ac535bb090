//! discourse_unsubscriber CLI: queue unsubscribe targets from a mail reader
//! and work them off in the background.

use clap::{Args, Parser};
use discourse_unsubscriber::app::{self, Command};
use discourse_unsubscriber::config::{Config, program_name};
use discourse_unsubscriber::telemetry::{TelemetryConfig, init_telemetry};

#[derive(Parser)]
#[command(
    name = "discourse_unsubscriber",
    version,
    about = "Unsubscribe from Discourse threads easily"
)]
struct Cli {
    #[command(flatten)]
    mode: Mode,

    /// Log status with levels instead of printing it, and trace HTTP traffic
    #[arg(long)]
    debug: bool,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct Mode {
    /// Start as a client, e.g. piped a mail from mutt
    #[arg(long)]
    client: bool,
    /// Start as a server
    #[arg(long)]
    server: bool,
}

impl Mode {
    fn command(&self) -> Command {
        if self.server {
            Command::Server
        } else {
            Command::Client
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let argv0 = std::env::args().next();
    let program = program_name(argv0.as_deref());
    let config = Config::from_env(&program)?.with_debug(cli.debug);

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: program,
        default_level: config.log_level.clone(),
    })?;

    app::run(cli.mode.command(), &config).await?;
    Ok(())
}
