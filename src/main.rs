use std::io::{self, Write};

use api_client_bench::bench::{self, BenchConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(io::stderr)
        .init();

    let config = BenchConfig::default();
    tracing::info!(base_url = %config.base_url, endpoint = %config.endpoint, "starting benchmark");

    let mut stdout = io::stdout();
    bench::run(&config, &mut stdout).await?;
    stdout.flush()?;

    Ok(())
}
