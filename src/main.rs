use ethsign_proxy::{ProxyConfig, SignerDescriptor, SignerDirectory, SignerProxy, SignerSource};
use eyre::{Context, Result};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ProxyConfig::from_env()?;
    let directory = match &config.signer_source {
        SignerSource::File(path) => {
            let descriptor = SignerDescriptor::load(path)?;
            SignerDirectory::single(&descriptor).await?
        }
        SignerSource::Directory(dir) => SignerDirectory::scan(dir)?,
    };

    let running = SignerProxy::new(&config, directory)?.start().await?;
    tracing::info!("Forwarding to {}", config.downstream_url);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    running.shutdown(config.shutdown_grace).await
}
