use clap::Parser;
use exchanger_shared::config::{self, InstanceLock};
use exchanger_task_creator::TaskCreatorService;

#[derive(Debug, Parser)]
#[command(name = "exchanger-task-creator", about = "Consumes TaskPayload from a system-queue and creates the matching downstream task")]
struct Cli {
    #[arg(long, default_value = "config")]
    config_dir: String,

    #[arg(long)]
    env: Option<String>,

    #[arg(long, default_value_t = 8081)]
    health_port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let app_config = config::load(&cli.config_dir, cli.env.as_deref())?;

    exchanger_shared::logging::init(&app_config.log);

    let _lock = InstanceLock::acquire("task-creator", &app_config.environment)?;

    tracing::info!(environment = %app_config.environment, "starting task-creator");

    let service = TaskCreatorService::new(app_config).with_health_port(cli.health_port);

    if let Err(err) = service.check_preconditions().await {
        tracing::error!(%err, "startup precondition check failed, aborting");
        std::process::exit(1);
    }

    service.run().await?;

    Ok(())
}
