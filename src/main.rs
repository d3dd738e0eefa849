//! CLI Entry Point for nev-client
//!
//! Provides command-line access to a NEV server (or the built-in simulator):
//! - Printing the discovered hardware topology
//! - Running a parameter sweep and printing the reduced curves
//! - Sending raw protocol lines
//!
//! # Usage
//!
//! Inspect the simulator:
//! ```bash
//! nev-client --simulate info --json
//! ```
//!
//! Sweep SAO 2 channel 0 from 0 V to 5 V in 10 steps:
//! ```bash
//! nev-client --host 192.168.0.10 sweep --kind SAO --device 2 --channel 0 --start 0 --stop 5 --steps 10
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use nev_client::config::{ClientConfig, DEFAULT_CONFIG_PATH};
use nev_client::discovery::{discover_digitizers, discover_outputs, read_back_outputs};
use nev_client::hardware::{DeviceKind, DigitizerSystem, OutputSystem};
use nev_client::logging;
use nev_client::protocol::SweepCommands;
use nev_client::sweep::{
    std_mean_curves, RunRequest, RunState, SamplingRate, SweepConfig, SweepDirection, SweepEvent,
    SweepRunner, SweepTarget, XAxis,
};
use nev_client::ProtocolClient;
use serde_json::json;
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser)]
#[command(name = "nev-client")]
#[command(about = "Control client for NEV lab instruments", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Use the in-process simulator instead of a server
    #[arg(long, global = true)]
    simulate: bool,

    /// Server host (overrides the config file)
    #[arg(long, global = true)]
    host: Option<String>,

    /// Server port (overrides the config file)
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Log level: trace, debug, info, warn, error
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the hardware topology reported by the server
    Info {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,

        /// Also read back current output channel values
        #[arg(long)]
        values: bool,
    },

    /// Run a parameter sweep on one output channel
    Sweep {
        /// Output device kind (SAO, DAO, SDO)
        #[arg(long)]
        kind: DeviceKind,

        /// Output device id
        #[arg(long)]
        device: u32,

        /// Channel index on the device
        #[arg(long)]
        channel: u32,

        /// First sweep value
        #[arg(long)]
        start: f64,

        /// Last sweep value
        #[arg(long)]
        stop: f64,

        /// Number of steps
        #[arg(long)]
        steps: u32,

        /// Sweep from stop to start
        #[arg(long)]
        descending: bool,

        /// Digitizer sampling rate in Hz (50000, 100000 or 150000)
        #[arg(long)]
        sampling: Option<u32>,

        /// Digitizer union to sample
        #[arg(long)]
        union: Option<u32>,

        /// X axis of the reduced curves: `sweep` or a channel legend like `Dev 0 chn 1`
        #[arg(long, default_value = "sweep")]
        x_axis: XAxis,

        /// Print the final snapshot and curves as JSON
        #[arg(long)]
        json: bool,
    },

    /// Send one protocol line and print the raw reply
    Raw {
        /// Command words, joined with single spaces
        #[arg(required = true, trailing_var_arg = true)]
        command: Vec<String>,
    },

    /// Stop the sweep running on the server
    Stop,

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    logging::init_from_config(&config.logging).context("Failed to initialize logging")?;

    match cli.command {
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
        Commands::Info { json, values } => {
            let client = connect(&config).await?;
            info_command(&client, json, values).await
        }
        Commands::Raw { command } => {
            let client = connect(&config).await?;
            let reply = client
                .send_raw(&command.join(" "))
                .await
                .context("Raw command failed")?;
            println!("{}", reply.trim_end());
            Ok(())
        }
        Commands::Stop => {
            let client = connect(&config).await?;
            SweepCommands::new(client)
                .stop()
                .await
                .context("STOP PSA failed")?;
            println!("Sweep stop sent");
            Ok(())
        }
        Commands::Sweep {
            kind,
            device,
            channel,
            start,
            stop,
            steps,
            descending,
            sampling,
            union,
            x_axis,
            json,
        } => {
            let client = connect(&config).await?;
            let mut timing = config.sweep.timing()?;
            if let Some(hz) = sampling {
                timing.sampling = SamplingRate::try_from(hz)?;
            }
            let sweep = SweepConfig {
                target: SweepTarget {
                    kind,
                    device_id: device,
                    channel,
                },
                start,
                stop,
                steps,
                direction: if descending {
                    SweepDirection::Descending
                } else {
                    SweepDirection::Ascending
                },
            };
            let (outputs, digitizers) = discover(&client).await?;
            let request = RunRequest {
                union_id: union.unwrap_or(config.sweep.union_id),
                sweep,
                timing,
                outputs,
                digitizers,
            };
            sweep_command(&client, &config, request, x_axis, json).await
        }
    }
}

fn load_config(cli: &Cli) -> Result<ClientConfig> {
    let mut config = ClientConfig::load_from(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    if cli.simulate {
        config.server.simulate = true;
    }
    if let Some(host) = &cli.host {
        config.server.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

async fn connect(config: &ClientConfig) -> Result<ProtocolClient> {
    ProtocolClient::from_config(&config.server)
        .await
        .with_context(|| {
            format!(
                "Cannot reach NEV server at {}:{}",
                config.server.host, config.server.port
            )
        })
}

async fn discover(client: &ProtocolClient) -> Result<(OutputSystem, DigitizerSystem)> {
    let outputs = discover_outputs(client)
        .await
        .context("Output discovery failed")?;
    let digitizers = discover_digitizers(client)
        .await
        .context("Digitizer discovery failed")?;
    Ok((outputs, digitizers))
}

async fn info_command(client: &ProtocolClient, as_json: bool, values: bool) -> Result<()> {
    let (mut outputs, digitizers) = discover(client).await?;
    if values {
        read_back_outputs(client, &mut outputs)
            .await
            .context("Output read-back failed")?;
    }

    if as_json {
        let doc = json!({ "outputs": outputs, "digitizers": digitizers });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    println!("Backend: {}", client.label());
    println!("Outputs ({} devices):", outputs.len());
    for device in outputs.devices() {
        println!(
            "  [{}] {} {} {} channels={} length={} freq={}",
            device.id,
            device.kind,
            device.name,
            device.model,
            device.channel_count(),
            device.data_length,
            device.frequency
        );
        if values {
            for channel in &device.channels {
                let preview: Vec<String> =
                    channel.data.iter().take(8).map(|v| format!("{v}")).collect();
                let more = if channel.data.len() > 8 { " ..." } else { "" };
                println!("      ch{}: {}{}", channel.index, preview.join(" "), more);
            }
        }
    }
    println!("Digitizers:");
    for device in digitizers.devices() {
        println!(
            "  [{}] {} {} slot={} channels={}",
            device.id,
            device.name,
            device.model,
            device.slot,
            device.channel_count()
        );
    }
    for union in digitizers.unions() {
        let members: Vec<String> = union.device_ids().map(|id| id.to_string()).collect();
        println!(
            "  union {}: devices=[{}] length={} freq={} trigger={}",
            union.id,
            members.join(" "),
            union.data_length,
            union.frequency,
            union.trigger.trigger_type
        );
    }
    Ok(())
}

async fn sweep_command(
    client: &ProtocolClient,
    config: &ClientConfig,
    request: RunRequest,
    x_axis: XAxis,
    as_json: bool,
) -> Result<()> {
    let runner = SweepRunner::new(client.clone()).with_poll_interval(config.sweep.poll_interval);
    let mut events = runner.subscribe();
    let run_id = runner.start_run(request).await.context("Sweep did not start")?;
    eprintln!("Sweep {run_id} running (Ctrl-C to stop)");

    let mut stop_sent = false;
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(SweepEvent::Snapshot(snapshot)) => {
                    eprintln!(
                        "  step {} value {:.6} ({})",
                        snapshot.stage, snapshot.last_value, snapshot.status
                    );
                }
                Ok(SweepEvent::State(state)) => tracing::debug!(%state, "run state"),
                Ok(SweepEvent::Finished(_)) | Err(RecvError::Closed) => break,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "progress output lagged behind the runner");
                }
            },
            _ = tokio::signal::ctrl_c(), if !stop_sent => {
                eprintln!("Stopping sweep...");
                runner.stop_run();
                if let Err(err) = SweepCommands::new(client.clone()).stop().await {
                    tracing::warn!(error = %err, "STOP PSA failed");
                }
                stop_sent = true;
            }
        }
    }

    let Some(outcome) = runner.wait().await else {
        bail!("Sweep task ended without an outcome");
    };
    let curves = std_mean_curves(&outcome.snapshot, x_axis)?;

    if as_json {
        let doc = json!({
            "run_id": outcome.run_id,
            "state": outcome.state.to_string(),
            "error": outcome.error,
            "snapshot": outcome.snapshot.as_ref(),
            "curves": curves,
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
    } else {
        println!("Run {} finished: {}", outcome.run_id, outcome.state);
        for curve in &curves {
            println!("{}:", curve.channel);
            println!("  {:>14} {:>14} {:>14}", "x", "mean", "std");
            for (x, point) in curve.x.iter().zip(&curve.y) {
                println!("  {:>14.6} {:>14.6} {:>14.6}", x, point.mean, point.std);
            }
        }
    }

    match outcome.state {
        RunState::Completed | RunState::Aborted => Ok(()),
        _ => bail!(
            "Sweep ended as {}: {}",
            outcome.state,
            outcome.error.unwrap_or_default()
        ),
    }
}
