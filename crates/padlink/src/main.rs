//! padlink: terminal play session.
//!
//! Connects to a receiver with one of the padlink transports and streams
//! control events read from stdin, one JSON event per line:
//!
//! ```text
//! {"id":"fire","type":"button","state":"pressed"}
//! {"id":"stick","type":"joystick","x":0.25,"y":-1.0}
//! ```
//!
//! Each event is re-encoded in the session's wire format (JSON or CSV) before
//! it is sent, so the same input drives a CSV receiver unchanged.
//!
//! # Usage
//!
//! ```text
//! padlink [OPTIONS]
//!
//! Options:
//!   --profile <FILE>          TOML session profile
//!   --connection-type <TYPE>  TCP, WEBSOCKET, BLUETOOTH, BLUETOOTH_LE, MQTT_V3, MQTT_V5
//!   --config <JSON>           Transport config JSON for --connection-type
//!   --format <FORMAT>         json or csv
//!   --connect-wait <SECS>     Give up if not connected after this long
//! ```
//!
//! Command-line options override the profile.  Every option can also be set
//! through the environment:
//!
//! | Variable                  | Option              |
//! |---------------------------|---------------------|
//! | `PADLINK_PROFILE`         | `--profile`         |
//! | `PADLINK_CONNECTION_TYPE` | `--connection-type` |
//! | `PADLINK_CONFIG`          | `--config`          |
//! | `PADLINK_FORMAT`          | `--format`          |
//! | `PADLINK_CONNECT_WAIT`    | `--connect-wait`    |
//!
//! The process exits non-zero when the connection fails, times out, or drops
//! during the session.  End of input and Ctrl+C both end the session cleanly.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use padlink::domain::Profile;
use padlink::{ConnectionFactory, PlaySession, SessionStats, StateStream};
use padlink_core::{decode_json, ConnectionState, ConnectionType, DataFormat};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Virtual control pad session over TCP, WebSocket, Bluetooth or MQTT.
#[derive(Debug, Parser)]
#[command(name = "padlink", about = "Stream control-pad events to a remote receiver", version)]
struct Cli {
    /// TOML profile naming the connection and session settings.
    #[arg(long, env = "PADLINK_PROFILE")]
    profile: Option<PathBuf>,

    /// Connection type, overriding the profile's `[connection] type`.
    #[arg(long, env = "PADLINK_CONNECTION_TYPE")]
    connection_type: Option<ConnectionType>,

    /// Transport config JSON, overriding the profile's `[connection.config]`.
    #[arg(long, env = "PADLINK_CONFIG")]
    config: Option<String>,

    /// Wire format for events.
    #[arg(long, env = "PADLINK_FORMAT")]
    format: Option<DataFormat>,

    /// Seconds to wait for a connected state before giving up.
    ///
    /// Without it the transport's own connect timeout applies; a WebSocket
    /// server then waits for a peer until interrupted.
    #[arg(long, env = "PADLINK_CONNECT_WAIT")]
    connect_wait: Option<u64>,
}

/// Everything needed to run one session, after merging profile and flags.
#[derive(Debug, PartialEq)]
struct SessionPlan {
    connection_type: ConnectionType,
    config_json: String,
    format: DataFormat,
    connect_wait: Option<Duration>,
}

impl Cli {
    /// Merges the optional profile with the command-line overrides.
    ///
    /// # Errors
    ///
    /// Fails if the profile cannot be loaded, or if neither source names a
    /// connection type and its config.
    fn into_plan(self) -> anyhow::Result<SessionPlan> {
        let profile = match &self.profile {
            Some(path) => Some(
                Profile::load(path)
                    .with_context(|| format!("failed to load profile {}", path.display()))?,
            ),
            None => None,
        };

        let connection_type = match (self.connection_type, &profile) {
            (Some(t), _) => t,
            (None, Some(p)) => p.connection.connection_type,
            (None, None) => bail!("no connection type: pass --connection-type or --profile"),
        };

        let config_json = match (self.config, &profile) {
            (Some(json), _) => json,
            (None, Some(p)) => p.config_json().context("invalid [connection.config] table")?,
            (None, None) => bail!("no transport config: pass --config or --profile"),
        };

        let format = self
            .format
            .or_else(|| profile.as_ref().map(|p| p.session.format))
            .unwrap_or_default();

        let connect_wait = self
            .connect_wait
            .or_else(|| profile.as_ref().and_then(|p| p.session.connect_wait_secs))
            .map(Duration::from_secs);

        Ok(SessionPlan {
            connection_type,
            config_json,
            format,
            connect_wait,
        })
    }
}

// ── Session driver ────────────────────────────────────────────────────────────

/// Waits until the connection is up or has given up.
///
/// Returns `None` when `limit` elapses first.
async fn await_connected(states: &mut StateStream, limit: Option<Duration>) -> Option<ConnectionState> {
    let settled = states.wait_for(|s| s.is_connected() || s.is_terminal());
    match limit {
        Some(limit) => tokio::time::timeout(limit, settled).await.ok().flatten(),
        None => settled.await,
    }
}

async fn run(plan: SessionPlan) -> anyhow::Result<SessionStats> {
    let connection = ConnectionFactory::new()
        .build(plan.connection_type, &plan.config_json)
        .with_context(|| format!("cannot create {} connection", plan.connection_type))?;
    let mut session = PlaySession::new(connection, plan.format);
    let mut states = session.states();
    session.start();

    let outcome = tokio::select! {
        state = await_connected(&mut states, plan.connect_wait) => state,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted while connecting");
            session.finish().await;
            bail!("interrupted before the connection was established");
        }
    };
    match outcome {
        Some(state) if state.is_connected() => info!(%state, "connected; reading events from stdin"),
        Some(state) => {
            session.finish().await;
            bail!("connection did not come up: {state}");
        }
        None => {
            session.finish().await;
            bail!("not connected within the connect wait");
        }
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    info!("end of input");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match decode_json(&line) {
                    Ok(event) => {
                        if let Some(delivery) = session.publish(&event) {
                            if let Err(e) = delivery.outcome().await {
                                debug!(id = %event.id, error = %e, "event not delivered");
                            }
                        }
                    }
                    Err(e) => warn!(error = %e, "skipping input line that is not an event"),
                }
            }
            state = states.next() => {
                if let Some(state) = state.filter(ConnectionState::is_terminal) {
                    session.finish().await;
                    bail!("connection lost: {state}");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("received Ctrl+C; ending session");
                break;
            }
        }
    }

    Ok(session.finish().await)
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let plan = Cli::parse().into_plan()?;
    info!(
        connection_type = %plan.connection_type,
        format = ?plan.format,
        "padlink starting"
    );

    let stats = run(plan).await?;
    info!(
        events_sent = stats.events_sent,
        encode_failures = stats.encode_failures,
        "padlink stopped"
    );
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
