//! CLI binary for publishing to and listening on a NATS broker.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod commands;

use std::time::Duration;

use bytes::Bytes;
use clap::{Args as ClapArgs, Parser, Subcommand};
use courier_messaging::{Client, ConnectionConfig};
use courier_messaging_nats::{NatsConnection, NatsConnectionOptions};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// CLI-specific error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Receipt encoding error
    #[error("failed to encode receipt: {0}")]
    Json(#[from] serde_json::Error),

    /// Messaging client error
    #[error(transparent)]
    Messaging(#[from] courier_messaging::Error),

    /// Signal handler error
    #[error("signal handler error: {0}")]
    Signal(#[from] std::io::Error),
}

/// Broker connection settings.
#[derive(Clone, Debug, ClapArgs)]
struct ConnectionArgs {
    /// Broker URL
    #[arg(long, default_value = courier_messaging::config::DEFAULT_URL, env = "NATS_URL")]
    url: String,

    /// Username for basic auth
    #[arg(long, env = "NATS_USERNAME")]
    username: Option<String>,

    /// Password for basic auth
    #[arg(long, env = "NATS_PASSWORD")]
    password: Option<String>,

    /// Connection name reported to the broker
    #[arg(long, env = "NATS_CONNECTION_NAME")]
    name: Option<String>,

    /// Connect timeout in seconds
    #[arg(long, default_value_t = 10, env = "NATS_CONNECT_TIMEOUT_SECS")]
    connect_timeout_secs: u64,

    /// Reconnect attempts after the connection drops
    #[arg(long, default_value_t = 5, env = "NATS_MAX_RECONNECTS")]
    max_reconnects: usize,

    /// Delay between reconnect attempts in milliseconds
    #[arg(long, default_value_t = 1000, env = "NATS_RECONNECT_WAIT_MS")]
    reconnect_wait_ms: u64,
}

impl ConnectionArgs {
    fn into_config(self) -> ConnectionConfig {
        ConnectionConfig {
            url: self.url,
            username: self.username.unwrap_or_default(),
            password: self.password.unwrap_or_default(),
            name: self.name.unwrap_or_default(),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            max_reconnects: self.max_reconnects,
            reconnect_wait: Duration::from_millis(self.reconnect_wait_ms),
            ..ConnectionConfig::default()
        }
    }
}

#[derive(Clone, Debug, Subcommand)]
enum Command {
    /// Log every message until interrupted
    Listen,

    /// Durably publish a message and print the acknowledgement as JSON
    Publish {
        /// Target subject
        subject: String,

        /// Message payload
        payload: String,
    },

    /// Send a request and print the reply
    Request {
        /// Target subject
        subject: String,

        /// Request payload
        payload: String,

        /// Reply timeout in milliseconds
        #[arg(long, default_value_t = 5000)]
        timeout_ms: u64,
    },
}

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Log level
    #[arg(long, default_value = "info", env = "COURIER_LOG_LEVEL")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Command,
}

async fn wait_for_signal() -> Result<(), Error> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received interrupt signal");
    }

    Ok(())
}

async fn run(
    client: &Client<NatsConnection>,
    command: Command,
    shutdown_token: CancellationToken,
) -> Result<(), Error> {
    match command {
        Command::Listen => {
            let _listener = commands::start_listener(client).await?;
            shutdown_token.cancelled().await;
        }
        Command::Publish { subject, payload } => {
            match commands::publish_durably(client, &subject, Bytes::from(payload)).await {
                Ok(receipt) => println!("{}", serde_json::to_string(&receipt)?),
                Err(Error::Messaging(e)) if e.is_timeout() => {
                    error!(subject = %subject, "no acknowledgement before the deadline");
                    return Err(e.into());
                }
                Err(e) => {
                    error!(subject = %subject, error = %e, "publish failed");
                    return Err(e);
                }
            }
        }
        Command::Request {
            subject,
            payload,
            timeout_ms,
        } => {
            let reply = client
                .request(&subject, payload, Duration::from_millis(timeout_ms))
                .await?;
            println!("{}", reply.payload_lossy());
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    tracing_subscriber::fmt().with_max_level(args.log_level).init();

    let client = Client::<NatsConnection>::connect(
        args.connection.into_config(),
        NatsConnectionOptions::default(),
    )
    .await?;

    // Create shared shutdown token
    let shutdown_token = CancellationToken::new();

    let signal_shutdown_token = shutdown_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_signal().await {
            error!(error = %e, "failed to wait for shutdown signal");
        }

        info!("Shutting down");
        signal_shutdown_token.cancel();
    });

    let result = tokio::select! {
        result = run(&client, args.command, shutdown_token.clone()) => result,
        () = shutdown_token.cancelled() => Ok(()),
    };

    client.close().await?;

    result
}
