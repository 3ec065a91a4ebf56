use clap::Parser;
use exchanger_shared::config::{self, InstanceLock};
use exchanger_worker::WorkerService;

#[derive(Debug, Parser)]
#[command(name = "exchanger-worker", about = "Fetches locked external tasks from the engine and drains completions back")]
struct Cli {
    #[arg(long, default_value = "config")]
    config_dir: String,

    #[arg(long)]
    env: Option<String>,

    #[arg(long, default_value_t = 8080)]
    health_port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let app_config = config::load(&cli.config_dir, cli.env.as_deref())?;

    exchanger_shared::logging::init(&app_config.log);

    let _lock = InstanceLock::acquire("worker", &app_config.environment)?;

    tracing::info!(environment = %app_config.environment, "starting worker");

    WorkerService::new(app_config)
        .with_health_port(cli.health_port)
        .run()
        .await?;

    Ok(())
}
