use std::{net::SocketAddr, process, sync::Arc};

use anyhow::Result;
use tokio::signal;

use questlink_broker::{
    accounts::HttpAccountDirectory, config::BrokerConfig, http, provider::ProviderClient,
    telemetry,
};

#[tokio::main]
async fn main() {
    telemetry::init();
    if let Err(error) = run().await {
        tracing::error!("broker shut down with error: {error}");
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = BrokerConfig::from_env()?;

    let provider = Arc::new(ProviderClient::new(
        config.provider.clone(),
        config.upstream_timeout,
    )?);
    let directory = Arc::new(HttpAccountDirectory::new(
        config.directory.clone(),
        config.upstream_timeout,
    )?);

    let context = Arc::new(http::AppContext {
        provider,
        directory,
    });
    let router = http::router(context);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(?addr, "http server listening");

    let server = axum::serve(listener, router).with_graceful_shutdown(async {
        let _ = signal::ctrl_c().await;
        tracing::info!("shutdown signal received");
    });

    server.await?;
    Ok(())
}
