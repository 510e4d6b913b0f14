//! Per-second history samples as returned by the dish, and their stitched form.
//!
//! The dish keeps its history in fixed-capacity ring buffers indexed by
//! `counter mod capacity`. A [`HistorySnapshot`] with [`BufferLayout::Ring`]
//! is one such raw reply. A snapshot with [`BufferLayout::Linear`] is a
//! stitched, chronological sequence built from one or more raw replies; it is
//! never re-wrapped.

use serde::{Deserialize, Serialize};

/// How the sample arrays of a snapshot are addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferLayout {
    /// Raw circular buffer; slot for counter `c` is `c mod capacity`.
    #[default]
    Ring,
    /// Already unwrapped; the last stored sample corresponds to `current`.
    Linear,
}

/// One of the parallel per-sample arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HistoryField {
    PopPingDropRate,
    PopPingLatencyMs,
    DownlinkThroughputBps,
    UplinkThroughputBps,
}

impl HistoryField {
    /// All fields, in the order they are copied and reported.
    pub const ALL: [HistoryField; 4] = [
        HistoryField::PopPingDropRate,
        HistoryField::PopPingLatencyMs,
        HistoryField::DownlinkThroughputBps,
        HistoryField::UplinkThroughputBps,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::PopPingDropRate => "pop_ping_drop_rate",
            Self::PopPingLatencyMs => "pop_ping_latency_ms",
            Self::DownlinkThroughputBps => "downlink_throughput_bps",
            Self::UplinkThroughputBps => "uplink_throughput_bps",
        }
    }
}

/// History reply (raw ring) or stitched sequence (linear).
///
/// The drop-rate array is mandatory and defines the buffer capacity. The other
/// arrays are `None` when the transport did not return them; readers treat a
/// missing value as `0.0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySnapshot {
    /// Absolute counter of the most recently written sample.
    pub current: u64,
    #[serde(default)]
    pub layout: BufferLayout,
    pub pop_ping_drop_rate: Vec<f64>,
    #[serde(default)]
    pub pop_ping_latency_ms: Option<Vec<f64>>,
    #[serde(default)]
    pub downlink_throughput_bps: Option<Vec<f64>>,
    #[serde(default)]
    pub uplink_throughput_bps: Option<Vec<f64>>,
}

impl HistorySnapshot {
    /// A raw ring snapshot carrying only drop rates.
    pub fn ring(current: u64, pop_ping_drop_rate: Vec<f64>) -> Self {
        Self {
            current,
            layout: BufferLayout::Ring,
            pop_ping_drop_rate,
            pop_ping_latency_ms: None,
            downlink_throughput_bps: None,
            uplink_throughput_bps: None,
        }
    }

    /// Attach (or replace) one of the optional arrays.
    pub fn with_field(mut self, field: HistoryField, values: Vec<f64>) -> Self {
        match field {
            HistoryField::PopPingDropRate => self.pop_ping_drop_rate = values,
            HistoryField::PopPingLatencyMs => self.pop_ping_latency_ms = Some(values),
            HistoryField::DownlinkThroughputBps => self.downlink_throughput_bps = Some(values),
            HistoryField::UplinkThroughputBps => self.uplink_throughput_bps = Some(values),
        }
        self
    }

    /// Number of stored slots (ring capacity for raw snapshots).
    pub fn stored_len(&self) -> usize {
        self.pop_ping_drop_rate.len()
    }

    pub fn is_linear(&self) -> bool {
        self.layout == BufferLayout::Linear
    }

    /// The array for `field`, if present.
    pub fn field(&self, field: HistoryField) -> Option<&[f64]> {
        match field {
            HistoryField::PopPingDropRate => Some(&self.pop_ping_drop_rate),
            HistoryField::PopPingLatencyMs => self.pop_ping_latency_ms.as_deref(),
            HistoryField::DownlinkThroughputBps => self.downlink_throughput_bps.as_deref(),
            HistoryField::UplinkThroughputBps => self.uplink_throughput_bps.as_deref(),
        }
    }

    /// Value of `field` at buffer index `index`; `None` when the field is
    /// absent or shorter than the drop-rate array.
    pub fn value(&self, field: HistoryField, index: usize) -> Option<f64> {
        self.field(field).and_then(|values| values.get(index).copied())
    }

    /// Empty linear sequence holding exactly the given fields.
    pub(crate) fn empty_linear(fields: &[HistoryField]) -> Self {
        let slot = |f: HistoryField| fields.contains(&f).then(Vec::new);
        Self {
            current: 0,
            layout: BufferLayout::Linear,
            pop_ping_drop_rate: Vec::new(),
            pop_ping_latency_ms: slot(HistoryField::PopPingLatencyMs),
            downlink_throughput_bps: slot(HistoryField::DownlinkThroughputBps),
            uplink_throughput_bps: slot(HistoryField::UplinkThroughputBps),
        }
    }

    pub(crate) fn field_mut(&mut self, field: HistoryField) -> Option<&mut Vec<f64>> {
        match field {
            HistoryField::PopPingDropRate => Some(&mut self.pop_ping_drop_rate),
            HistoryField::PopPingLatencyMs => self.pop_ping_latency_ms.as_mut(),
            HistoryField::DownlinkThroughputBps => self.downlink_throughput_bps.as_mut(),
            HistoryField::UplinkThroughputBps => self.uplink_throughput_bps.as_mut(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_read_as_none() {
        let h = HistorySnapshot::ring(5, vec![0.0; 4]);
        assert_eq!(h.value(HistoryField::PopPingDropRate, 3), Some(0.0));
        assert_eq!(h.value(HistoryField::PopPingLatencyMs, 0), None);
        assert_eq!(h.value(HistoryField::PopPingDropRate, 4), None);
    }

    #[test]
    fn short_optional_field_is_tolerated() {
        let h = HistorySnapshot::ring(5, vec![0.0; 4])
            .with_field(HistoryField::PopPingLatencyMs, vec![20.0, 21.0]);
        assert_eq!(h.value(HistoryField::PopPingLatencyMs, 1), Some(21.0));
        assert_eq!(h.value(HistoryField::PopPingLatencyMs, 2), None);
    }

    #[test]
    fn layout_defaults_to_ring_when_deserialized() {
        let h: HistorySnapshot =
            serde_json::from_str(r#"{"current": 3, "pop_ping_drop_rate": [0.0, 1.0]}"#).unwrap();
        assert_eq!(h.layout, BufferLayout::Ring);
        assert!(h.downlink_throughput_bps.is_none());
    }

    #[test]
    fn empty_linear_keeps_only_requested_fields() {
        let h = HistorySnapshot::empty_linear(&[
            HistoryField::PopPingDropRate,
            HistoryField::UplinkThroughputBps,
        ]);
        assert!(h.is_linear());
        assert!(h.pop_ping_latency_ms.is_none());
        assert_eq!(h.uplink_throughput_bps, Some(Vec::new()));
    }
}
