use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    time::Duration,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use qr_share_core::LifecycleConfig;

#[derive(Debug, Parser)]
#[command(
    name = "qr-share",
    author,
    version,
    about = "Share a file with devices on your network through a QR code",
    args_conflicts_with_subcommands = true
)]
pub struct Cli {
    /// File to share.
    #[arg(value_name = "FILE")]
    pub file: Option<PathBuf>,

    /// Address to bind the HTTP listener to.
    #[arg(long, env = "QR_SHARE_BIND", default_value = "0.0.0.0")]
    pub bind: IpAddr,

    /// Port to listen on.
    #[arg(long, env = "QR_SHARE_PORT", default_value_t = 3000)]
    pub port: u16,

    /// Host placed in the QR code instead of the detected local address.
    #[arg(long, env = "QR_SHARE_ADVERTISE_HOST")]
    pub advertise_host: Option<String>,

    /// How often the status page sends a heartbeat.
    #[arg(long, env = "QR_SHARE_HEARTBEAT_INTERVAL_SECS", default_value_t = 5)]
    pub heartbeat_interval_secs: u64,

    /// Silence after which a viewer is considered gone.
    #[arg(long, env = "QR_SHARE_STALE_AFTER_SECS", default_value_t = 15)]
    pub stale_after_secs: u64,

    /// Period of the stale-viewer sweep.
    #[arg(long, env = "QR_SHARE_SWEEP_INTERVAL_SECS", default_value_t = 5)]
    pub sweep_interval_secs: u64,

    /// How long open connections may take to wind down once the session ends.
    #[arg(long, env = "QR_SHARE_SHUTDOWN_GRACE_SECS", default_value_t = 5)]
    pub shutdown_grace_secs: u64,

    /// Do not open the status page in a local browser.
    #[arg(long, env = "QR_SHARE_NO_BROWSER", default_value_t = false)]
    pub no_browser: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Write this binary's path into a desktop automation workflow template.
    InstallWorkflow {
        /// Workflow template containing `{{QR_SHARE_PATH}}` placeholders.
        #[arg(long)]
        template: PathBuf,

        /// Binary path to write; defaults to the running executable.
        #[arg(long)]
        binary: Option<PathBuf>,
    },
}

/// Validated settings for one sharing session.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub file: PathBuf,
    pub listen_addr: SocketAddr,
    pub advertise_host: Option<String>,
    pub lifecycle: LifecycleConfig,
    pub shutdown_grace: Duration,
    pub open_browser: bool,
}

impl ServerConfig {
    pub fn from_cli(file: PathBuf, cli: &Cli) -> Result<Self> {
        let lifecycle = LifecycleConfig::new(
            Duration::from_secs(cli.heartbeat_interval_secs),
            Duration::from_secs(cli.stale_after_secs),
            Duration::from_secs(cli.sweep_interval_secs),
        )
        .context("invalid heartbeat settings")?;

        Ok(ServerConfig {
            file,
            listen_addr: SocketAddr::new(cli.bind, cli.port),
            advertise_host: cli
                .advertise_host
                .as_ref()
                .map(|host| host.trim().to_string())
                .filter(|host| !host.is_empty()),
            lifecycle,
            shutdown_grace: Duration::from_secs(cli.shutdown_grace_secs),
            open_browser: !cli.no_browser,
        })
    }

    /// Status page URL on this machine, using the port actually bound (which differs
    /// from the configured one when binding to port 0).
    pub fn local_page_url(&self, bound: SocketAddr) -> String {
        format!("http://localhost:{}", bound.port())
    }
}

impl TryFrom<Cli> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        let file = cli
            .file
            .clone()
            .context("no file given; usage: qr-share <FILE>")?;
        ServerConfig::from_cli(file, &cli)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("qr-share").chain(args.iter().copied())).unwrap()
    }

    #[test_timeout::timeout]
    fn defaults_apply_when_only_a_file_is_given() {
        let config = ServerConfig::try_from(parse(&["notes.pdf"])).unwrap();
        assert_eq!(config.listen_addr.port(), 3000);
        assert!(config.listen_addr.ip().is_unspecified());
        assert_eq!(config.lifecycle, LifecycleConfig::default());
        assert!(config.open_browser);
        assert_eq!(config.advertise_host, None);
        assert_eq!(config.shutdown_grace, Duration::from_secs(5));
    }

    #[test_timeout::timeout]
    fn overrides_are_applied() {
        let config = ServerConfig::try_from(parse(&[
            "notes.pdf",
            "--port",
            "8080",
            "--advertise-host",
            " laptop.local ",
            "--heartbeat-interval-secs",
            "2",
            "--stale-after-secs",
            "7",
            "--sweep-interval-secs",
            "1",
            "--shutdown-grace-secs",
            "0",
            "--no-browser",
        ]))
        .unwrap();
        assert_eq!(config.listen_addr.port(), 8080);
        assert_eq!(config.advertise_host.as_deref(), Some("laptop.local"));
        assert_eq!(config.lifecycle.heartbeat_interval(), Duration::from_secs(2));
        assert_eq!(config.lifecycle.stale_after(), Duration::from_secs(7));
        assert_eq!(config.lifecycle.sweep_interval(), Duration::from_secs(1));
        assert_eq!(config.shutdown_grace, Duration::ZERO);
        assert!(!config.open_browser);
    }

    #[test_timeout::timeout]
    fn rejects_heartbeat_slower_than_timeout() {
        let err = ServerConfig::try_from(parse(&[
            "notes.pdf",
            "--heartbeat-interval-secs",
            "30",
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("invalid heartbeat settings"));
    }

    #[test_timeout::timeout]
    fn missing_file_is_an_error() {
        assert!(ServerConfig::try_from(parse(&[])).is_err());
    }

    #[test_timeout::timeout]
    fn install_workflow_subcommand_parses() {
        let cli = parse(&["install-workflow", "--template", "document.wflow"]);
        match cli.command {
            Some(Commands::InstallWorkflow { template, binary }) => {
                assert_eq!(template, PathBuf::from("document.wflow"));
                assert!(binary.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
