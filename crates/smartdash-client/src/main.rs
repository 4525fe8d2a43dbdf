//! SmartDash demo device.
//!
//! Connects to a dashboard and wires two virtual pins:
//!
//! - **V100** – every value pushed here makes the device write a random
//!   number between 0 and 10 to **V1**.
//! - **V3** – a switch; its value is mirrored onto trigger **V100**, so
//!   turning V3 on also produces a new random V1 value.
//!
//! # Configuration
//!
//! Settings come from an optional TOML file (`--config`), then individual
//! command-line flags override it:
//!
//! ```text
//! smartdash-client --token YOUR_TOKEN --server 192.168.1.20 --port 8000
//! SMARTDASH_TOKEN=YOUR_TOKEN smartdash-client --config device.toml
//! ```
//!
//! `--save-config PATH` writes the merged settings to a TOML file and exits,
//! which is the quickest way to get a starting `device.toml`.
//!
//! Logging goes through `tracing`; `RUST_LOG` wins over the `log_level`
//! from the config file.

use std::path::PathBuf;
use std::sync::{Arc, Weak};

use anyhow::Context;
use clap::Parser;
use rand::Rng;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use smartdash_client::infrastructure::storage::{load_config, save_config};
use smartdash_client::{async_handler_fn, websocket_client, ClientConfig, PinValue, SmartDash};

/// Command-line options for the demo device.
#[derive(Debug, Parser)]
#[command(name = "smartdash-client", version, about = "SmartDash demo device")]
struct Cli {
    /// TOML config file.  Flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Device auth token.
    #[arg(long, env = "SMARTDASH_TOKEN")]
    token: Option<String>,

    /// Dashboard host name or IP address.
    #[arg(long, env = "SMARTDASH_SERVER")]
    server: Option<String>,

    /// Dashboard port.
    #[arg(long, env = "SMARTDASH_PORT")]
    port: Option<u16>,

    /// Connect with wss:// instead of ws://.
    #[arg(long)]
    secure: bool,

    /// Write the merged settings to this TOML file and exit.
    #[arg(long, value_name = "PATH")]
    save_config: Option<PathBuf>,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<(ClientConfig, Option<PathBuf>)> {
        let mut config = match &self.config {
            Some(path) => load_config(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => ClientConfig::new(""),
        };
        if let Some(token) = self.token {
            config.token = token;
        }
        if let Some(server) = self.server {
            config.server = server;
        }
        if self.port.is_some() {
            config.port = self.port;
        }
        if self.secure {
            config.secure = true;
        }
        anyhow::ensure!(
            !config.token.is_empty(),
            "no token given (use --token, SMARTDASH_TOKEN, or a config file)"
        );
        Ok((config, self.save_config))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (config, save_to) = Cli::parse().into_config()?;

    if let Some(path) = save_to {
        save_config(&path, &config)
            .with_context(|| format!("saving {}", path.display()))?;
        println!("wrote {}", path.display());
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    info!("SmartDash demo device starting ({})", config.endpoint());

    let client = websocket_client(config)?;
    register_demo_handlers(&client);

    let supervisor = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.run().await })
    };

    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl+C")?;
    info!("shutdown signal received");

    client.shutdown().await;
    if let Err(e) = supervisor.await {
        warn!("supervisor task ended abnormally: {e}");
    }
    info!("SmartDash demo device stopped");
    Ok(())
}

/// Handlers hold a `Weak` so the client is not kept alive by its own registry.
fn register_demo_handlers(client: &Arc<SmartDash>) {
    let weak = Arc::downgrade(client);
    client.on_data(
        "V100",
        async_handler_fn(move |_value| {
            let weak: Weak<SmartDash> = weak.clone();
            async move {
                let Some(client) = weak.upgrade() else {
                    return Ok(());
                };
                let n: i64 = rand::thread_rng().gen_range(0..=10);
                client.write("V1", n).await?;
                Ok::<_, anyhow::Error>(())
            }
        }),
    );

    let weak = Arc::downgrade(client);
    client.on_data(
        "V3",
        async_handler_fn(move |value| {
            let weak: Weak<SmartDash> = weak.clone();
            async move {
                let Some(client) = weak.upgrade() else {
                    return Ok(());
                };
                let on = trigger_state(&value);
                info!("V3 switched {}", if on { "on" } else { "off" });
                client.switch_trigger("V100", on).await?;
                Ok::<_, anyhow::Error>(())
            }
        }),
    );
}

/// Switch position for a V3 value: off only for an explicit zero or "off".
fn trigger_state(value: &PinValue) -> bool {
    value.as_bool().unwrap_or(true)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
