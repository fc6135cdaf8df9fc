use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cli::{SweepMode, Transport};
use crate::metrics::AggregateResult;

/// Writes the per-load-level rows of a completed sweep.
///
/// The primary sink is delimited text: a header plus one row per level,
/// with the packet-loss column present only when the sweep measured loss.
/// An optional JSON report adds run metadata for later comparison.
pub struct ResultsWriter {
    csv_path: PathBuf,
    json_path: Option<PathBuf>,
}

impl ResultsWriter {
    pub fn new(csv_path: impl Into<PathBuf>) -> Self {
        Self {
            csv_path: csv_path.into(),
            json_path: None,
        }
    }

    pub fn with_json(mut self, json_path: impl Into<PathBuf>) -> Self {
        self.json_path = Some(json_path.into());
        self
    }

    pub fn write(
        &self,
        transport: Transport,
        mode: SweepMode,
        rows: &[AggregateResult],
    ) -> Result<()> {
        self.write_csv(mode, rows)
            .with_context(|| format!("failed to write results to {:?}", self.csv_path))?;
        info!("results saved to {:?}", self.csv_path);

        if let Some(ref json_path) = self.json_path {
            write_json_report(json_path, transport, mode, rows)
                .with_context(|| format!("failed to write JSON report to {:?}", json_path))?;
            info!("JSON report saved to {json_path:?}");
        }
        Ok(())
    }

    fn write_csv(&self, mode: SweepMode, rows: &[AggregateResult]) -> Result<()> {
        let mut writer = csv::Writer::from_path(&self.csv_path)?;
        let with_loss = rows.iter().any(|row| row.packet_loss_pct.is_some());

        if with_loss {
            writer.write_record([
                mode.level_heading(),
                "Throughput (bytes/s)",
                "Avg Latency (s)",
                "Packet Loss (%)",
            ])?;
        } else {
            writer.write_record([
                mode.level_heading(),
                "Throughput (bytes/s)",
                "Avg Latency (s)",
            ])?;
        }

        for row in rows {
            let mut record = vec![
                row.load_level.to_string(),
                row.throughput_bps.to_string(),
                row.avg_latency_secs.to_string(),
            ];
            if with_loss {
                record.push(row.packet_loss_pct.unwrap_or(0.0).to_string());
            }
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Full sweep report for the optional JSON sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepReport {
    pub transport: Transport,
    pub mode: SweepMode,
    pub generated_at: chrono::DateTime<chrono::Utc>,
    pub system: SystemInfo,
    pub results: Vec<AggregateResult>,
}

/// Host details recorded for reproducibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    pub os: String,
    pub architecture: String,
    pub cpu_cores: usize,
    pub harness_version: String,
}

impl SystemInfo {
    pub fn collect() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            architecture: std::env::consts::ARCH.to_string(),
            cpu_cores: num_cpus::get(),
            harness_version: crate::VERSION.to_string(),
        }
    }
}

fn write_json_report(
    path: &Path,
    transport: Transport,
    mode: SweepMode,
    rows: &[AggregateResult],
) -> Result<()> {
    let report = SweepReport {
        transport,
        mode,
        generated_at: chrono::Utc::now(),
        system: SystemInfo::collect(),
        results: rows.to_vec(),
    };
    std::fs::write(path, serde_json::to_string_pretty(&report)?)?;
    Ok(())
}
