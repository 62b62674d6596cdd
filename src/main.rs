use clap::Parser;
use graft::host::{HostConfig, PluginHost};
use graft::monitoring::init_logging;
use graft::plugin::{Discoverer, EchoPlugin, FactoryDiscoverer};
use std::path::PathBuf;
use std::sync::Arc;

/// Plugin host with a live admin API.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// JSON configuration file (defaults apply when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overrides the configuration file
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> graft::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => HostConfig::from_file(path)?,
        None => HostConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config = config.with_bind_addr(&bind);
    }

    init_logging(&config.logging)?;

    let builtin: Arc<dyn Discoverer> =
        Arc::new(FactoryDiscoverer::new("builtin").with_default::<EchoPlugin>());
    let host = PluginHost::new(config, vec![builtin])?;

    host.start().await?;
    host.serve().await
}
