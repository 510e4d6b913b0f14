//! Per-sample history export.

use serde::Serialize;

use crate::fields::FieldValue;
use crate::history::{HistoryField, HistorySnapshot};
use crate::window::{SampleLimit, resolve_window};

/// Size and end counter of a bulk read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BulkGeneral {
    pub samples: u64,
    pub end_counter: u64,
}

/// Parallel per-sample arrays, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BulkHistory {
    pub pop_ping_drop_rate: Vec<f64>,
    /// No value where the ping was fully dropped.
    pub pop_ping_latency_ms: Vec<Option<f64>>,
    pub downlink_throughput_bps: Vec<Option<f64>>,
    pub uplink_throughput_bps: Vec<Option<f64>>,
    /// Retired by the dish; always empty values.
    pub snr: Vec<Option<f64>>,
    pub scheduled: Vec<Option<bool>>,
    pub obstructed: Vec<Option<bool>>,
}

impl BulkHistory {
    /// Column names, in the order of [`BulkHistory::row`].
    pub const FIELD_NAMES: [&'static str; 7] = [
        "pop_ping_drop_rate",
        "pop_ping_latency_ms",
        "downlink_throughput_bps",
        "uplink_throughput_bps",
        "snr",
        "scheduled",
        "obstructed",
    ];

    pub fn len(&self) -> usize {
        self.pop_ping_drop_rate.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pop_ping_drop_rate.is_empty()
    }

    /// Values of sample `i` across all columns.
    pub fn row(&self, i: usize) -> Vec<FieldValue> {
        vec![
            self.pop_ping_drop_rate.get(i).copied().into(),
            self.pop_ping_latency_ms.get(i).copied().flatten().into(),
            self.downlink_throughput_bps.get(i).copied().flatten().into(),
            self.uplink_throughput_bps.get(i).copied().flatten().into(),
            self.snr.get(i).copied().flatten().into(),
            self.scheduled.get(i).copied().flatten().into(),
            self.obstructed.get(i).copied().flatten().into(),
        ]
    }

    /// Each column as `(name, values)`.
    pub fn columns(&self) -> Vec<(&'static str, Vec<FieldValue>)> {
        let rows: Vec<Vec<FieldValue>> = (0..self.len()).map(|i| self.row(i)).collect();
        Self::FIELD_NAMES
            .iter()
            .enumerate()
            .map(|(c, &name)| (name, rows.iter().map(|r| r[c].clone()).collect()))
            .collect()
    }
}

/// Copy the selected window of `history` out sample by sample.
pub fn bulk_history(
    history: &HistorySnapshot,
    limit: SampleLimit,
    start: Option<u64>,
) -> (BulkGeneral, BulkHistory) {
    let window = resolve_window(Some(history), limit, start);
    let n = window.indices.len();
    let mut bulk = BulkHistory {
        pop_ping_drop_rate: Vec::with_capacity(n),
        pop_ping_latency_ms: Vec::with_capacity(n),
        downlink_throughput_bps: Vec::with_capacity(n),
        uplink_throughput_bps: Vec::with_capacity(n),
        snr: vec![None; n],
        scheduled: vec![None; n],
        obstructed: vec![None; n],
    };

    for i in window.indices {
        let drop = history
            .value(HistoryField::PopPingDropRate, i)
            .unwrap_or(0.0);
        bulk.pop_ping_drop_rate.push(drop);
        let latency = if drop < 1.0 {
            history.value(HistoryField::PopPingLatencyMs, i)
        } else {
            None
        };
        bulk.pop_ping_latency_ms.push(latency);
        bulk.downlink_throughput_bps
            .push(history.value(HistoryField::DownlinkThroughputBps, i));
        bulk.uplink_throughput_bps
            .push(history.value(HistoryField::UplinkThroughputBps, i));
    }

    let general = BulkGeneral {
        samples: window.samples,
        end_counter: history.current,
    };
    (general, bulk)
}
