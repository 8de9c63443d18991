use anyhow::{Context, Result, bail};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use rdt_abstract::{InputSpec, LossConfig, ProtocolConfig, ProtocolKind};
use rdt_simulator::{SimulationReport, TransferSimulation, scenario_runner};

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless reliable-transfer simulator")]
struct Args {
    /// Run a scenario file and check its assertions.
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// sw, gbn or sr
    #[arg(long, default_value = "gbn")]
    protocol: ProtocolKind,

    #[arg(long, default_value_t = 4)]
    window: usize,

    #[arg(long, default_value_t = 8)]
    modulus: usize,

    #[arg(long, default_value_t = 200)]
    timeout_ms: u64,

    #[arg(long, default_value_t = 10)]
    poll_interval_ms: u64,

    #[arg(long, default_value_t = 500)]
    linger_ms: u64,

    /// File to transfer. Without it a generated pattern of --size bytes is used.
    #[arg(long)]
    input: Option<PathBuf>,

    #[arg(long, default_value_t = 16 * 1024)]
    size: usize,

    /// Sender drops outbound data frames with this probability.
    #[arg(long, default_value_t = 0.0)]
    send_data_loss: f64,

    /// Sender ignores inbound acks with this probability.
    #[arg(long, default_value_t = 0.0)]
    recv_ack_loss: f64,

    /// Receiver drops outbound acks with this probability.
    #[arg(long, default_value_t = 0.0)]
    send_ack_loss: f64,

    /// Receiver ignores inbound data frames with this probability.
    #[arg(long, default_value_t = 0.0)]
    recv_data_loss: f64,

    #[arg(long)]
    seed: Option<u64>,

    /// Give up after this long.
    #[arg(long, default_value_t = 60_000)]
    horizon_ms: u64,

    /// Write the bytes the receiver delivered.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Write a JSON trace of the finished simulation.
    #[arg(long)]
    trace_out: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt::init();
    info!("rdt-sim-cli starting…");

    let report = match &args.scenario {
        Some(path) => scenario_runner::run_scenario(path)?,
        None => run_adhoc(&args)?,
    };

    info!(
        completed = report.completed,
        bytes = report.output_len,
        data_frames = report.sender_stats.data_frames_sent,
        duration_ms = report.duration_ms,
        "simulation done"
    );

    if let Some(path) = &args.output {
        fs::write(path, &report.output)
            .with_context(|| format!("Failed to write output file {}", path.display()))?;
    }
    if let Some(path) = &args.trace_out {
        write_trace(path, &report)?;
    }
    if !report.completed {
        bail!(
            "transfer did not complete (sender: {:?}, receiver: {:?})",
            report.sender_error,
            report.receiver_error
        );
    }
    Ok(())
}

fn run_adhoc(args: &Args) -> Result<SimulationReport> {
    let protocol = ProtocolConfig {
        kind: args.protocol,
        window_size: args.window,
        modulus: args.modulus,
        timeout_ms: args.timeout_ms,
        poll_interval_ms: args.poll_interval_ms,
        linger_ms: args.linger_ms,
    };
    let sender_loss = LossConfig {
        send_data: args.send_data_loss,
        recv_ack: args.recv_ack_loss,
        seed: args.seed,
        ..Default::default()
    };
    let receiver_loss = LossConfig {
        send_ack: args.send_ack_loss,
        recv_data: args.recv_data_loss,
        seed: args.seed.map(|s| s.wrapping_add(1)),
        ..Default::default()
    };

    let input = match &args.input {
        Some(path) => fs::read(path)
            .with_context(|| format!("Failed to read input file {}", path.display()))?,
        None => InputSpec::Pattern { size: args.size }.materialize(),
    };

    info!("Starting ad-hoc {} transfer of {} bytes…", protocol.kind, input.len());
    TransferSimulation::new(protocol)
        .with_sender_loss(sender_loss)
        .with_receiver_loss(receiver_loss)
        .with_horizon(Duration::from_millis(args.horizon_ms))
        .run(&input)
        .context("Invalid simulation parameters")
}

fn write_trace(path: &Path, report: &SimulationReport) -> Result<()> {
    let data = report
        .to_json()
        .context("Failed to serialize simulation trace")?;
    fs::write(path, &data)
        .with_context(|| format!("Failed to write trace file {}", path.display()))?;
    Ok(())
}
