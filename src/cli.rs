use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

/// Network performance measurement harness: paired TCP/UDP echo servers and
/// load-generating clients.
#[derive(Parser, Debug)]
#[clap(version, about, long_about = None)]
pub struct Args {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a server until a client sends the STOP payload
    Serve(ServeArgs),
    /// Run a load sweep against a running server, then stop it
    Sweep(SweepArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct ServeArgs {
    /// Transport to serve
    #[clap(short, long, value_enum, default_value_t = Transport::Tcp)]
    pub transport: Transport,

    /// Address to bind
    #[clap(long, default_value = crate::defaults::HOST)]
    pub host: String,

    /// Port to bind
    #[clap(short, long, default_value_t = crate::defaults::PORT)]
    pub port: u16,

    /// Probability [0, 1] of withholding a UDP acknowledgment (simulated loss)
    #[clap(long, default_value_t = crate::defaults::LOSS_PROBABILITY)]
    pub packet_loss: f64,

    /// Exchange log file, truncated at startup (defaults to <transport>_log.txt)
    #[clap(long)]
    pub log_file: Option<PathBuf>,

    /// Receive buffer size in bytes
    #[clap(long, default_value_t = crate::defaults::RECV_BUFFER)]
    pub buffer_size: usize,
}

#[derive(clap::Args, Debug, Clone)]
pub struct SweepArgs {
    /// Transport to measure
    #[clap(short, long, value_enum, default_value_t = Transport::Tcp)]
    pub transport: Transport,

    /// What the load levels vary: concurrent clients, or messages per client
    #[clap(short, long, value_enum, default_value_t = SweepMode::Clients)]
    pub mode: SweepMode,

    /// Load levels, comma separated (defaults depend on the mode)
    #[clap(short, long, value_delimiter = ',')]
    pub levels: Option<Vec<usize>>,

    /// Messages each client sends (clients mode)
    #[clap(short = 'n', long, default_value_t = crate::defaults::NUM_MESSAGES)]
    pub messages: usize,

    /// Repeated trials per level (messages mode)
    #[clap(short, long, default_value_t = crate::defaults::TRIALS)]
    pub runs: usize,

    /// Server address
    #[clap(long, default_value = crate::defaults::HOST)]
    pub host: String,

    /// Server port
    #[clap(short, long, default_value_t = crate::defaults::PORT)]
    pub port: u16,

    /// Bounded UDP reply wait in milliseconds
    #[clap(long, default_value_t = crate::defaults::UDP_REPLY_TIMEOUT.as_millis() as u64)]
    pub reply_timeout_ms: u64,

    /// CSV results file (defaults to <transport>_performance_log.csv)
    #[clap(short, long)]
    pub output: Option<PathBuf>,

    /// Optional JSON report alongside the CSV
    #[clap(long)]
    pub json_output: Option<PathBuf>,

    /// Exchange log file to append to (defaults to <transport>_log.txt)
    #[clap(long)]
    pub log_file: Option<PathBuf>,

    /// Receive buffer size in bytes
    #[clap(long, default_value_t = crate::defaults::RECV_BUFFER)]
    pub buffer_size: usize,
}

/// Transports the harness can measure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum Transport {
    #[clap(name = "tcp")]
    Tcp,
    #[clap(name = "udp")]
    Udp,
}

impl Transport {
    pub fn default_log_file(&self) -> PathBuf {
        match self {
            Transport::Tcp => PathBuf::from("tcp_log.txt"),
            Transport::Udp => PathBuf::from("udp_log.txt"),
        }
    }

    pub fn default_output(&self) -> PathBuf {
        match self {
            Transport::Tcp => PathBuf::from("tcp_performance_log.csv"),
            Transport::Udp => PathBuf::from("udp_performance_log.csv"),
        }
    }
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transport::Tcp => write!(f, "TCP"),
            Transport::Udp => write!(f, "UDP"),
        }
    }
}

/// Sweep shapes, matching the two test configurations the harness grew out
/// of: scale the client count, or scale the per-client message count.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum SweepMode {
    /// Vary the number of concurrent clients, fixed messages per client
    #[clap(name = "clients")]
    Clients,
    /// Vary the message count for one client, averaged over repeated trials
    #[clap(name = "messages")]
    Messages,
}

impl SweepMode {
    pub fn default_levels(&self) -> Vec<usize> {
        match self {
            SweepMode::Clients => crate::defaults::CLIENT_LEVELS.to_vec(),
            SweepMode::Messages => crate::defaults::MESSAGE_LEVELS.to_vec(),
        }
    }

    /// Heading for the load-level column in result rows.
    pub fn level_heading(&self) -> &'static str {
        match self {
            SweepMode::Clients => "Num Clients",
            SweepMode::Messages => "Num Messages",
        }
    }
}

impl std::fmt::Display for SweepMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SweepMode::Clients => write!(f, "Concurrent Clients"),
            SweepMode::Messages => write!(f, "Message Count"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_display() {
        assert_eq!(Transport::Tcp.to_string(), "TCP");
        assert_eq!(Transport::Udp.to_string(), "UDP");
    }

    #[test]
    fn test_transport_default_files() {
        assert_eq!(
            Transport::Udp.default_output(),
            PathBuf::from("udp_performance_log.csv")
        );
        assert_eq!(Transport::Tcp.default_log_file(), PathBuf::from("tcp_log.txt"));
    }

    #[test]
    fn test_sweep_mode_default_levels() {
        assert_eq!(SweepMode::Clients.default_levels(), vec![1, 2, 5, 10, 20, 50]);
        assert_eq!(
            SweepMode::Messages.default_levels(),
            vec![1, 10, 20, 30, 50, 100, 200, 500]
        );
    }

    #[test]
    fn test_parse_sweep_levels() {
        let args = Args::parse_from([
            "net-benchmark",
            "sweep",
            "--transport",
            "udp",
            "--levels",
            "1,5,25",
        ]);
        match args.command {
            Command::Sweep(sweep) => {
                assert_eq!(sweep.transport, Transport::Udp);
                assert_eq!(sweep.levels, Some(vec![1, 5, 25]));
            }
            _ => panic!("expected sweep subcommand"),
        }
    }

    #[test]
    fn test_serve_defaults() {
        let args = Args::parse_from(["net-benchmark", "serve"]);
        match args.command {
            Command::Serve(serve) => {
                assert_eq!(serve.transport, Transport::Tcp);
                assert_eq!(serve.port, crate::defaults::PORT);
                assert_eq!(serve.packet_loss, crate::defaults::LOSS_PROBABILITY);
            }
            _ => panic!("expected serve subcommand"),
        }
    }
}
