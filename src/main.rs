//! # Network Benchmark Harness - Main Entry Point
//!
//! Two subcommands share one binary:
//!
//! - `serve`: run a TCP or UDP dispatcher until a client sends the STOP
//!   payload
//! - `sweep`: drive a load sweep against a running server, write the result
//!   rows, and stop the server
//!
//! Logging goes through `tracing`; the level is controlled via the
//! `RUST_LOG` environment variable and defaults to `info`.

use anyhow::Result;
use clap::Parser;
use net_benchmark::{
    benchmark::{BenchmarkConfig, BenchmarkRunner},
    cli::{Args, Command, ServeArgs, SweepArgs, Transport},
    logging::ColorizedFormatter,
    results::ResultsWriter,
    server::{ServerConfig, TcpDispatcher, UdpDispatcher},
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .event_format(ColorizedFormatter)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    match args.command {
        Command::Serve(serve) => run_server(serve).await,
        Command::Sweep(sweep) => run_sweep(sweep).await,
    }
}

/// Run a dispatcher until the STOP handshake completes.
async fn run_server(args: ServeArgs) -> Result<()> {
    let log_path = args
        .log_file
        .unwrap_or_else(|| args.transport.default_log_file());
    let config = ServerConfig {
        host: args.host,
        port: args.port,
        loss_probability: args.packet_loss,
        buffer_size: args.buffer_size,
        log_path,
    };

    match args.transport {
        Transport::Tcp => TcpDispatcher::bind(config).await?.run().await,
        Transport::Udp => UdpDispatcher::bind(config).await?.run().await,
    }
}

/// Run a full sweep, then write one result row per load level.
async fn run_sweep(args: SweepArgs) -> Result<()> {
    let config = BenchmarkConfig::from_args(&args)?;
    let rows = BenchmarkRunner::new(config).run().await?;

    let output = args
        .output
        .unwrap_or_else(|| args.transport.default_output());
    let mut writer = ResultsWriter::new(output);
    if let Some(json_output) = args.json_output {
        writer = writer.with_json(json_output);
    }
    writer.write(args.transport, args.mode, &rows)?;

    info!("{} performance sweep completed", args.transport);
    Ok(())
}
