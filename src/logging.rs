use std::fmt;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use colored::*;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::registry::LookupSpan;

/// Append-only exchange log shared by dispatcher handlers and client
/// sessions.
///
/// One file per run: the server truncates it at startup and writes a header
/// line; clients open the same file for appending. Every append goes through
/// a single async mutex so concurrent handlers never interleave lines.
#[derive(Clone)]
pub struct CommLog {
    file: Arc<Mutex<File>>,
}

impl CommLog {
    /// Open the log for a new server run, discarding any previous contents.
    pub async fn create(path: impl AsRef<Path>, header: &str) -> std::io::Result<Self> {
        let mut file = File::create(path).await?;
        file.write_all(format!("{header}\n").as_bytes()).await?;
        file.flush().await?;
        Ok(Self {
            file: Arc::new(Mutex::new(file)),
        })
    }

    /// Open an existing log for appending (client side).
    pub async fn append(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        Ok(Self {
            file: Arc::new(Mutex::new(file)),
        })
    }

    /// Record one exchange: `<from> -> <to>: <text>`.
    pub async fn exchange(
        &self,
        from: impl fmt::Display,
        to: impl fmt::Display,
        text: &str,
    ) -> std::io::Result<()> {
        self.line(&format!("{from} -> {to}: {text}")).await
    }

    /// Record a simulated-loss event for an exchange that got no reply.
    pub async fn packet_loss(
        &self,
        from: impl fmt::Display,
        to: impl fmt::Display,
        addr: SocketAddr,
    ) -> std::io::Result<()> {
        self.line(&format!("Packet loss: {from} -> {to}: {addr}"))
            .await
    }

    /// Separator the sweep driver writes between repeated trials.
    pub async fn separator(&self) -> std::io::Result<()> {
        self.line(&"#".repeat(100)).await
    }

    /// Append one raw line.
    pub async fn line(&self, line: &str) -> std::io::Result<()> {
        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await
    }
}

/// A custom tracing event formatter for colorizing log output based on level.
///
/// This formatter is designed to provide clean, user-facing output where the
/// entire log line is colored according to its severity level, without any
/// extra metadata like timestamps or log levels printed.
pub struct ColorizedFormatter;

impl<S, N> FormatEvent<S, N> for ColorizedFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        // Buffer the formatted fields to apply color to the entire line.
        let mut buffer = String::new();
        let mut buf_writer = Writer::new(&mut buffer);
        ctx.format_fields(buf_writer.by_ref(), event)?;

        let colored_output = match *event.metadata().level() {
            Level::INFO => buffer.white(),
            Level::WARN => buffer.yellow(),
            Level::ERROR => buffer.red(),
            Level::DEBUG => buffer.blue(),
            Level::TRACE => buffer.purple(),
        };

        writeln!(writer, "{}", colored_output)
    }
}
