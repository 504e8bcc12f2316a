use anyhow::Result;
use clap::Parser;
use qr_share::{
    config::{Cli, Commands, ServerConfig},
    telemetry::Telemetry,
    workflow::install_workflow,
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let telemetry = Telemetry::init()?;
    let cli = Cli::parse();

    if let Some(Commands::InstallWorkflow { template, binary }) = cli.command {
        let installed = install_workflow(&template, binary)?;
        info!(
            template = %installed.template.display(),
            binary = %installed.binary.display(),
            "workflow ready; restart the automation app to pick it up"
        );
        return Ok(());
    }

    let config = ServerConfig::try_from(cli)?;
    info!(file = %config.file.display(), listen_addr = %config.listen_addr, "starting qr-share");

    let reason = qr_share::run(config, telemetry.metrics_handle()).await?;
    info!(reason = ?reason, "sharing session ended");
    Ok(())
}
