//! # Load Driver
//!
//! Orchestrates a sweep: for each configured load level it runs the client
//! sessions for that level, collects their results, and reduces them to one
//! aggregate row. Two sweep shapes are supported:
//!
//! - **Clients mode**: level N runs N concurrent sessions, each sending a
//!   fixed number of messages on its own worker task.
//! - **Messages mode**: level M runs one fresh session sending M messages,
//!   repeated for a configured number of trials and averaged.
//!
//! Workers hand their [`SessionResult`] back through their `JoinHandle`, so
//! there is no shared mutable collection to race on. A session that fails to
//! connect records a zero result for its slot; a single bad slot never
//! aborts the sweep.
//!
//! After the sweep — in either mode, whatever its outcome — a dedicated
//! session sends the STOP payload so a long-running server shuts down.

use std::time::Duration;

use anyhow::{ensure, Result};
use tracing::{info, warn};

use crate::cli::{SweepArgs, SweepMode, Transport};
use crate::logging::CommLog;
use crate::metrics::{self, AggregateResult, SessionResult};
use crate::payload::{self, PayloadFn};
use crate::protocol::STOP_PAYLOAD;
use crate::session::{ClientSession, SessionConfig, TcpSession, UdpSession};

/// Client id reserved for the dedicated STOP session, outside the range the
/// sweep hands to measurement sessions.
const STOP_CLIENT_ID: u32 = 99;

/// Configuration for one full sweep.
#[derive(Debug, Clone)]
pub struct BenchmarkConfig {
    pub transport: Transport,
    pub mode: SweepMode,
    /// Load levels, in the order their rows are produced.
    pub levels: Vec<usize>,
    /// Messages each client sends (clients mode).
    pub messages_per_client: usize,
    /// Repeated trials per level (messages mode).
    pub trials: usize,
    pub session: SessionConfig,
    /// Exchange log the sessions append to.
    pub log_path: std::path::PathBuf,
}

impl BenchmarkConfig {
    /// Build a sweep configuration from parsed CLI arguments, applying
    /// per-mode defaults and validating the load shape.
    pub fn from_args(args: &SweepArgs) -> Result<Self> {
        let levels = args
            .levels
            .clone()
            .unwrap_or_else(|| args.mode.default_levels());
        ensure!(!levels.is_empty(), "at least one load level is required");
        ensure!(args.runs > 0, "at least one trial per level is required");

        let mut session = SessionConfig::new(args.host.clone(), args.port);
        session.buffer_size = args.buffer_size;
        session.reply_timeout = Duration::from_millis(args.reply_timeout_ms);

        Ok(Self {
            transport: args.transport,
            mode: args.mode,
            levels,
            messages_per_client: args.messages,
            trials: args.runs,
            session,
            log_path: args
                .log_file
                .clone()
                .unwrap_or_else(|| args.transport.default_log_file()),
        })
    }
}

/// Drives a full sweep and produces one aggregate row per load level.
pub struct BenchmarkRunner {
    config: BenchmarkConfig,
}

impl BenchmarkRunner {
    pub fn new(config: BenchmarkConfig) -> Self {
        Self { config }
    }

    /// Run the sweep. The STOP session is sent unconditionally afterwards,
    /// even when a level failed.
    pub async fn run(&self) -> Result<Vec<AggregateResult>> {
        info!(
            "starting {} sweep over {} ({} levels)",
            self.config.transport,
            self.config.mode,
            self.config.levels.len()
        );
        let log = CommLog::append(&self.config.log_path).await?;

        let rows = match self.config.mode {
            SweepMode::Clients => self.sweep_clients(&log).await,
            SweepMode::Messages => self.sweep_messages(&log).await,
        };

        self.send_stop(&log).await;
        rows
    }

    /// Clients mode: level N runs N sessions concurrently and joins them all
    /// before aggregating.
    async fn sweep_clients(&self, log: &CommLog) -> Result<Vec<AggregateResult>> {
        let mut rows = Vec::with_capacity(self.config.levels.len());
        for &num_clients in &self.config.levels {
            info!(
                "testing {num_clients} {} client(s), {} messages each",
                self.config.transport, self.config.messages_per_client
            );

            let mut workers = Vec::with_capacity(num_clients);
            for client_index in 1..=num_clients {
                let transport = self.config.transport;
                let session = self.config.session.clone();
                let log = log.clone();
                let num_messages = self.config.messages_per_client;
                workers.push(tokio::spawn(async move {
                    run_session(transport, client_index as u32, session, log, num_messages).await
                }));
            }

            let mut results = Vec::with_capacity(num_clients);
            for worker in workers {
                match worker.await {
                    Ok(result) => results.push(result),
                    Err(e) => {
                        warn!("client worker did not complete: {e}");
                        results.push(SessionResult::failed(self.tracks_loss()));
                    }
                }
            }
            rows.push(metrics::aggregate(num_clients, &results));
        }
        Ok(rows)
    }

    /// Messages mode: level M runs one fresh session per trial and averages
    /// across the trials.
    async fn sweep_messages(&self, log: &CommLog) -> Result<Vec<AggregateResult>> {
        let mut rows = Vec::with_capacity(self.config.levels.len());
        for &num_messages in &self.config.levels {
            let mut trial_results = Vec::with_capacity(self.config.trials);
            for trial in 1..=self.config.trials {
                info!(
                    "run {trial}/{}: testing {num_messages} messages",
                    self.config.trials
                );
                let result = run_session(
                    self.config.transport,
                    1,
                    self.config.session.clone(),
                    log.clone(),
                    num_messages,
                )
                .await;
                trial_results.push(result);
                log.separator().await?;
            }
            rows.push(metrics::aggregate(num_messages, &trial_results));
        }
        Ok(rows)
    }

    /// Terminate the server with a dedicated session; same send/ack contract
    /// as any other payload.
    async fn send_stop(&self, log: &CommLog) {
        let outcome = match self.config.transport {
            Transport::Tcp => {
                let mut session =
                    TcpSession::new(STOP_CLIENT_ID, self.config.session.clone(), log.clone());
                match session.connect().await {
                    Ok(()) => {
                        let result = session.send(STOP_PAYLOAD).await.map(|_| ());
                        session.close().await;
                        result
                    }
                    Err(e) => Err(e),
                }
            }
            Transport::Udp => {
                match UdpSession::bind(STOP_CLIENT_ID, self.config.session.clone(), log.clone())
                    .await
                {
                    Ok(mut session) => {
                        let result = session.send(STOP_PAYLOAD).await.map(|_| ());
                        session.close().await;
                        result
                    }
                    Err(e) => Err(e),
                }
            }
        };

        match outcome {
            Ok(()) => info!("sent STOP to the server"),
            Err(e) => warn!("STOP session failed: {e}"),
        }
    }

    fn tracks_loss(&self) -> bool {
        self.config.transport == Transport::Udp
    }
}

/// One full client run on a worker task.
///
/// A refused connect — or any session error mid-run — records a zero result
/// for the slot instead of propagating, so the sweep always produces a row
/// per level.
async fn run_session(
    transport: Transport,
    id: u32,
    config: SessionConfig,
    log: CommLog,
    num_messages: usize,
) -> SessionResult {
    match transport {
        Transport::Tcp => {
            let mut session = TcpSession::new(id, config, log);
            if let Err(e) = session.connect().await {
                warn!("client {} failed to connect: {e}", session.id());
                return SessionResult::failed(false);
            }
            let payload: PayloadFn =
                payload::distressed_payload(session.id(), "TCP", num_messages);
            match session.run(num_messages, &payload).await {
                Ok(result) => result,
                Err(e) => {
                    warn!("client {} aborted: {e}", session.id());
                    SessionResult::failed(false)
                }
            }
        }
        Transport::Udp => {
            let mut session = match UdpSession::bind(id, config, log).await {
                Ok(session) => session,
                Err(e) => {
                    warn!("client C[{id}] failed to bind: {e}");
                    return SessionResult::failed(true);
                }
            };
            let payload: PayloadFn =
                payload::distressed_payload(session.id(), "UDP", num_messages);
            match session.run(num_messages, &payload).await {
                Ok(result) => result,
                Err(e) => {
                    warn!("client {} aborted: {e}", session.id());
                    SessionResult::failed(true)
                }
            }
        }
    }
}
