use std::time::Duration;

use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};

/// Final accounting for one completed client session. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResult {
    /// Payload bytes per second over the whole run.
    pub throughput_bps: f64,
    /// Mean round-trip latency in seconds; 0 when nothing was acknowledged.
    pub avg_latency_secs: f64,
    /// Lost messages as a percentage of messages sent; `None` for TCP runs,
    /// where a missing reply is a connection error rather than loss.
    pub packet_loss_pct: Option<f64>,
    pub messages_acked: usize,
    pub messages_lost: usize,
    pub bytes_sent: usize,
}

impl SessionResult {
    /// All-zero result recorded for a session slot that failed to connect,
    /// so one refused connection never aborts a whole sweep.
    pub fn failed(track_loss: bool) -> Self {
        Self {
            throughput_bps: 0.0,
            avg_latency_secs: 0.0,
            packet_loss_pct: track_loss.then_some(0.0),
            messages_acked: 0,
            messages_lost: 0,
            bytes_sent: 0,
        }
    }
}

/// Accumulates per-message outcomes during a session run.
///
/// Latencies land in an HDR histogram with three significant figures, which
/// keeps the mean accurate without retaining every sample.
pub struct SessionRecorder {
    histogram: Histogram<u64>,
    acked: usize,
    lost: usize,
    bytes_sent: usize,
    track_loss: bool,
}

impl SessionRecorder {
    pub fn new(track_loss: bool) -> Result<Self, hdrhistogram::CreationError> {
        Ok(Self {
            histogram: Histogram::<u64>::new(3)?,
            acked: 0,
            lost: 0,
            bytes_sent: 0,
            track_loss,
        })
    }

    /// Record an acknowledged exchange and its round-trip latency.
    pub fn record_ack(&mut self, latency: Duration, bytes: usize) {
        let latency_ns = latency.as_nanos().max(1) as u64;
        self.histogram.saturating_record(latency_ns);
        self.acked += 1;
        self.bytes_sent += bytes;
    }

    /// Record a send whose bounded reply wait elapsed.
    pub fn record_lost(&mut self, bytes: usize) {
        self.lost += 1;
        self.bytes_sent += bytes;
    }

    pub fn acked(&self) -> usize {
        self.acked
    }

    pub fn lost(&self) -> usize {
        self.lost
    }

    /// Reduce the recorded outcomes over the measured wall-clock span.
    pub fn finish(self, elapsed: Duration) -> SessionResult {
        let elapsed_secs = elapsed.as_secs_f64();
        let throughput_bps = if elapsed_secs > 0.0 {
            self.bytes_sent as f64 / elapsed_secs
        } else {
            0.0
        };
        let avg_latency_secs = if self.acked > 0 {
            self.histogram.mean() / 1_000_000_000.0
        } else {
            0.0
        };
        let sent = self.acked + self.lost;
        let packet_loss_pct = self.track_loss.then(|| {
            if sent > 0 {
                100.0 * self.lost as f64 / sent as f64
            } else {
                0.0
            }
        });

        SessionResult {
            throughput_bps,
            avg_latency_secs,
            packet_loss_pct,
            messages_acked: self.acked,
            messages_lost: self.lost,
            bytes_sent: self.bytes_sent,
        }
    }
}

/// One averaged row of a sweep: the load level plus the mean of each
/// session-result field at that level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateResult {
    pub load_level: usize,
    pub throughput_bps: f64,
    pub avg_latency_secs: f64,
    pub packet_loss_pct: Option<f64>,
}

/// Arithmetic mean of each field across session results.
///
/// An empty input yields an all-zero row rather than failing, and the means
/// are commutative, so completion order across concurrent sessions does not
/// matter.
pub fn aggregate(load_level: usize, results: &[SessionResult]) -> AggregateResult {
    if results.is_empty() {
        return AggregateResult {
            load_level,
            throughput_bps: 0.0,
            avg_latency_secs: 0.0,
            packet_loss_pct: None,
        };
    }

    let n = results.len() as f64;
    let throughput_bps = results.iter().map(|r| r.throughput_bps).sum::<f64>() / n;
    let avg_latency_secs = results.iter().map(|r| r.avg_latency_secs).sum::<f64>() / n;

    let loss_values: Vec<f64> = results.iter().filter_map(|r| r.packet_loss_pct).collect();
    let packet_loss_pct = if loss_values.is_empty() {
        None
    } else {
        Some(loss_values.iter().sum::<f64>() / loss_values.len() as f64)
    };

    AggregateResult {
        load_level,
        throughput_bps,
        avg_latency_secs,
        packet_loss_pct,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(throughput: f64, latency: f64, loss: Option<f64>) -> SessionResult {
        SessionResult {
            throughput_bps: throughput,
            avg_latency_secs: latency,
            packet_loss_pct: loss,
            messages_acked: 0,
            messages_lost: 0,
            bytes_sent: 0,
        }
    }

    #[test]
    fn test_recorder_accounting() {
        let mut recorder = SessionRecorder::new(true).unwrap();
        recorder.record_ack(Duration::from_millis(2), 100);
        recorder.record_ack(Duration::from_millis(4), 100);
        recorder.record_lost(100);

        let result = recorder.finish(Duration::from_secs(1));
        assert_eq!(result.messages_acked, 2);
        assert_eq!(result.messages_lost, 1);
        assert_eq!(result.bytes_sent, 300);
        assert!((result.throughput_bps - 300.0).abs() < 1e-6);
        // HDR histogram keeps 3 significant figures; the mean of 2ms and 4ms
        // stays within that tolerance.
        assert!((result.avg_latency_secs - 0.003).abs() < 1e-4);
        let loss = result.packet_loss_pct.unwrap();
        assert!((0.0..=100.0).contains(&loss));
        assert!((loss - 100.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_elapsed_and_empty_run() {
        let recorder = SessionRecorder::new(false).unwrap();
        let result = recorder.finish(Duration::ZERO);
        assert_eq!(result.throughput_bps, 0.0);
        assert_eq!(result.avg_latency_secs, 0.0);
        assert_eq!(result.packet_loss_pct, None);
    }

    #[test]
    fn test_all_lost_has_full_loss_and_zero_latency() {
        let mut recorder = SessionRecorder::new(true).unwrap();
        for _ in 0..10 {
            recorder.record_lost(64);
        }
        let result = recorder.finish(Duration::from_millis(500));
        assert_eq!(result.packet_loss_pct, Some(100.0));
        assert_eq!(result.avg_latency_secs, 0.0);
        assert!(result.throughput_bps > 0.0);
    }

    #[test]
    fn test_loss_free_recorder_reports_zero_pct() {
        let mut recorder = SessionRecorder::new(true).unwrap();
        recorder.record_ack(Duration::from_millis(1), 10);
        let result = recorder.finish(Duration::from_millis(10));
        assert_eq!(result.packet_loss_pct, Some(0.0));
    }

    #[test]
    fn test_aggregate_empty_is_all_zero() {
        let row = aggregate(10, &[]);
        assert_eq!(row.load_level, 10);
        assert_eq!(row.throughput_bps, 0.0);
        assert_eq!(row.avg_latency_secs, 0.0);
        assert_eq!(row.packet_loss_pct, None);
    }

    #[test]
    fn test_aggregate_means_each_field() {
        let rows = vec![
            result(100.0, 0.2, Some(0.0)),
            result(300.0, 0.4, Some(50.0)),
        ];
        let row = aggregate(2, &rows);
        assert!((row.throughput_bps - 200.0).abs() < 1e-9);
        assert!((row.avg_latency_secs - 0.3).abs() < 1e-9);
        assert_eq!(row.packet_loss_pct, Some(25.0));
    }

    #[test]
    fn test_aggregate_is_order_independent() {
        let a = result(10.0, 0.1, None);
        let b = result(20.0, 0.3, None);
        let c = result(60.0, 0.5, None);
        let forward = aggregate(3, &[a.clone(), b.clone(), c.clone()]);
        let backward = aggregate(3, &[c, b, a]);
        assert_eq!(forward.throughput_bps, backward.throughput_bps);
        assert_eq!(forward.avg_latency_secs, backward.avg_latency_secs);
    }
}
