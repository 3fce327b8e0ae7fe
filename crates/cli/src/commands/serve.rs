//! `miniluma serve`: start the HTTP API and chat UI.

use anyhow::{Context, Result};
use miniluma_config::AppConfig;

pub async fn run(mut config: AppConfig, host: Option<String>, port: Option<u16>) -> Result<()> {
    if let Some(host) = host {
        config.gateway.host = host;
    }
    if let Some(port) = port {
        config.gateway.port = port;
    }

    println!("MiniLuma Gateway");
    println!("   Listening: http://{}:{}", config.gateway.host, config.gateway.port);
    println!("   Provider:  {}", config.default_provider);
    println!("   Memory:    {}", config.memory.backend);

    miniluma_gateway::start(config)
        .await
        .context("Gateway stopped with an error")?;

    Ok(())
}
