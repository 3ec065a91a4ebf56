use clap::Parser;
use exchanger_shared::config::{self, InstanceLock};
use exchanger_tracker::TrackerService;

#[derive(Debug, Parser)]
#[command(name = "exchanger-tracker", about = "Polls sent-queues for downstream task completion")]
struct Cli {
    #[arg(long, default_value = "config")]
    config_dir: String,

    #[arg(long)]
    env: Option<String>,

    #[arg(long, default_value_t = 8082)]
    health_port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let app_config = config::load(&cli.config_dir, cli.env.as_deref())?;

    exchanger_shared::logging::init(&app_config.log);

    let _lock = InstanceLock::acquire("tracker", &app_config.environment)?;

    tracing::info!(environment = %app_config.environment, "starting tracker");

    let service = TrackerService::new(app_config).with_health_port(cli.health_port);
    service.run().await?;

    Ok(())
}
