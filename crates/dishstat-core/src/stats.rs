//! History statistics: ping drop, outage run lengths, latency and usage.
//!
//! [`history_stats`] resolves a window over a snapshot and reduces it in a
//! single pass plus one sort of the latency values. The result is a plain
//! value; computing it twice over the same input yields the same record.
//!
//! Conventions carried over from previously recorded data:
//! - drop ratios above 1 count as 1,
//! - a missing latency/throughput value counts as `0.0`,
//! - byte totals round half to even.

use serde::Serialize;

use crate::history::{HistoryField, HistorySnapshot};
use crate::window::{SampleLimit, SampleWindow, resolve_window};

/// Per-second and per-minute run-length histogram size.
pub const RUN_BUCKETS: usize = 60;
/// Ten decile boundaries plus the maximum.
pub const DECILE_MARKERS: usize = 11;
/// Number of throughput load buckets.
pub const LOAD_BUCKETS: usize = 15;
/// Throughput (bits/s) at or below which a sample falls in load bucket 0.
pub const LOAD_BUCKET_BASE_BPS: f64 = 500_000.0;

// ---------------------------------------------------------------------------
// Result records
// ---------------------------------------------------------------------------

/// Window size and counter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneralStats {
    pub samples: u64,
    /// Counter of the newest sample; becomes the next resume point.
    pub end_counter: Option<u64>,
}

/// Ping drop totals.
///
/// The obstructed/unscheduled counters are no longer fed by the dish and are
/// always zero; they stay in the record so the output shape is stable.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct PingDropStats {
    pub total_ping_drop: f64,
    pub count_full_ping_drop: u64,
    pub count_obstructed: u64,
    pub total_obstructed_ping_drop: f64,
    pub count_full_obstructed_ping_drop: u64,
    pub count_unscheduled: u64,
    pub total_unscheduled_ping_drop: f64,
    pub count_full_unscheduled_ping_drop: u64,
}

/// Histogram of consecutive full-drop runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunLengthStats {
    /// Run at the start of the window; it may have begun before it.
    pub init_run_fragment: u64,
    /// Run still open when the window ended.
    pub final_run_fragment: u64,
    /// `run_seconds[l - 1]` sums the lengths of complete runs of `l` seconds.
    pub run_seconds: Vec<u64>,
    /// Runs longer than a minute, bucketed by `min((l - 1) / 60 - 1, 59)`.
    pub run_minutes: Vec<u64>,
}

/// Latency means and deciles.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencyStats {
    /// Mean over samples with drop < 1, weighted by `1 - drop`.
    pub mean_all_ping_latency: Option<f64>,
    pub deciles_all_ping_latency: [Option<f64>; DECILE_MARKERS],
    /// Mean over samples with no drop at all.
    pub mean_full_ping_latency: Option<f64>,
    pub deciles_full_ping_latency: [Option<f64>; DECILE_MARKERS],
    pub stdev_full_ping_latency: Option<f64>,
}

/// Drop-free latency split by concurrent throughput.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadedLatencyStats {
    pub load_bucket_samples: [u64; LOAD_BUCKETS],
    pub load_bucket_min_latency: [Option<f64>; LOAD_BUCKETS],
    pub load_bucket_median_latency: [Option<f64>; LOAD_BUCKETS],
    pub load_bucket_max_latency: [Option<f64>; LOAD_BUCKETS],
}

/// Transferred bytes over the window.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct UsageStats {
    pub download_usage: u64,
    pub upload_usage: u64,
}

/// Everything computed from one window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsResult {
    pub general: GeneralStats,
    pub ping_drop: PingDropStats,
    pub run_length: RunLengthStats,
    pub latency: LatencyStats,
    pub loaded_latency: LoadedLatencyStats,
    pub usage: UsageStats,
}

// ---------------------------------------------------------------------------
// Accumulators
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct RunTracker {
    run_length: u64,
    init: Option<u64>,
    seconds: Vec<u64>,
    minutes: Vec<u64>,
}

impl RunTracker {
    fn new() -> Self {
        Self {
            run_length: 0,
            init: None,
            seconds: vec![0; RUN_BUCKETS],
            minutes: vec![0; RUN_BUCKETS],
        }
    }

    fn observe(&mut self, full_drop: bool) {
        if full_drop {
            self.run_length += 1;
            return;
        }
        if self.run_length > 0 {
            if self.init.is_none() {
                self.init = Some(self.run_length);
            } else {
                self.record(self.run_length);
            }
            self.run_length = 0;
        } else if self.init.is_none() {
            self.init = Some(0);
        }
    }

    fn record(&mut self, length: u64) {
        if length <= RUN_BUCKETS as u64 {
            self.seconds[(length - 1) as usize] += length;
        } else {
            let bucket = ((length - 1) / 60 - 1).min(RUN_BUCKETS as u64 - 1);
            self.minutes[bucket as usize] += length;
        }
    }

    fn finish(self) -> RunLengthStats {
        let (init_run_fragment, final_run_fragment) = match self.init {
            Some(init) => (init, self.run_length),
            // Nothing but full drops: the whole window is one leading run.
            None => (self.run_length, 0),
        };
        RunLengthStats {
            init_run_fragment,
            final_run_fragment,
            run_seconds: self.seconds,
            run_minutes: self.minutes,
        }
    }
}

/// Load bucket for a concurrent throughput in bits/s.
pub fn load_bucket(throughput_bps: f64) -> usize {
    if throughput_bps > LOAD_BUCKET_BASE_BPS {
        ((throughput_bps / LOAD_BUCKET_BASE_BPS).log2() as usize).min(LOAD_BUCKETS - 1)
    } else {
        0
    }
}

// ---------------------------------------------------------------------------
// Quantiles
// ---------------------------------------------------------------------------

/// Weighted mean and decile markers over `(value, weight)` pairs sorted by value.
///
/// Marker `k` (for `k < 10`) is the first value at which the cumulative weight
/// reaches `k * W / 10`; the last marker is the maximum value.
fn weighted_deciles(sorted: &[(f64, f64)]) -> (Option<f64>, [Option<f64>; DECILE_MARKERS]) {
    let (Some(&(first_value, first_weight)), Some(&(max_value, _))) =
        (sorted.first(), sorted.last())
    else {
        return (None, [None; DECILE_MARKERS]);
    };
    let total_weight: f64 = sorted.iter().map(|&(_, w)| w).sum();

    let mut markers = [None; DECILE_MARKERS];
    let mut pos = 0;
    let mut value = first_value;
    let mut accum_weight = first_weight;
    for (k, marker) in markers.iter_mut().take(DECILE_MARKERS - 1).enumerate() {
        let boundary = total_weight * k as f64 / 10.0;
        while accum_weight < boundary && pos + 1 < sorted.len() {
            pos += 1;
            value = sorted[pos].0;
            accum_weight += sorted[pos].1;
        }
        *marker = Some(value);
    }
    markers[DECILE_MARKERS - 1] = Some(max_value);

    let weighted_sum: f64 = sorted.iter().map(|&(v, w)| v * w).sum();
    (Some(weighted_sum / total_weight), markers)
}

fn median(sorted: &[f64]) -> Option<f64> {
    let n = sorted.len();
    match n {
        0 => None,
        _ if n % 2 == 1 => Some(sorted[n / 2]),
        _ => Some((sorted[n / 2 - 1] + sorted[n / 2]) / 2.0),
    }
}

fn population_stdev(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some(variance.sqrt())
}

fn loaded_latency(mut buckets: Vec<Vec<f64>>) -> LoadedLatencyStats {
    let mut out = LoadedLatencyStats {
        load_bucket_samples: [0; LOAD_BUCKETS],
        load_bucket_min_latency: [None; LOAD_BUCKETS],
        load_bucket_median_latency: [None; LOAD_BUCKETS],
        load_bucket_max_latency: [None; LOAD_BUCKETS],
    };
    for (i, bucket) in buckets.iter_mut().enumerate().take(LOAD_BUCKETS) {
        bucket.sort_by(f64::total_cmp);
        out.load_bucket_samples[i] = bucket.len() as u64;
        out.load_bucket_min_latency[i] = bucket.first().copied();
        out.load_bucket_median_latency[i] = median(bucket);
        out.load_bucket_max_latency[i] = bucket.last().copied();
    }
    out
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Resolve a window over `history` and compute its statistics.
pub fn history_stats(
    history: &HistorySnapshot,
    limit: SampleLimit,
    start: Option<u64>,
) -> StatsResult {
    let window = resolve_window(Some(history), limit, start);
    window_stats(history, &window)
}

/// Compute statistics over an already resolved window of `history`.
pub fn window_stats(history: &HistorySnapshot, window: &SampleWindow) -> StatsResult {
    let mut ping_drop = PingDropStats::default();
    let mut runs = RunTracker::new();
    let mut usage_down = 0.0_f64;
    let mut usage_up = 0.0_f64;
    let mut rtt_full: Vec<f64> = Vec::new();
    let mut rtt_all: Vec<(f64, f64)> = Vec::new();
    let mut rtt_buckets: Vec<Vec<f64>> = vec![Vec::new(); LOAD_BUCKETS];

    for i in window.indices.clone() {
        let mut drop = history
            .value(HistoryField::PopPingDropRate, i)
            .unwrap_or(0.0);
        let full_drop = drop >= 1.0;
        if full_drop {
            drop = 1.0;
            ping_drop.count_full_ping_drop += 1;
        }
        runs.observe(full_drop);
        ping_drop.total_ping_drop += drop;

        let down = history
            .value(HistoryField::DownlinkThroughputBps, i)
            .unwrap_or(0.0);
        let up = history
            .value(HistoryField::UplinkThroughputBps, i)
            .unwrap_or(0.0);
        usage_down += down;
        usage_up += up;

        let rtt = history
            .value(HistoryField::PopPingLatencyMs, i)
            .unwrap_or(0.0);
        if drop == 0.0 {
            rtt_full.push(rtt);
            rtt_buckets[load_bucket(down + up)].push(rtt);
        }
        if drop < 1.0 {
            rtt_all.push((rtt, 1.0 - drop));
        }
    }

    rtt_all.sort_by(|a, b| a.0.total_cmp(&b.0));
    let (mean_all, deciles_all) = weighted_deciles(&rtt_all);
    rtt_full.sort_by(f64::total_cmp);
    let unit_weighted: Vec<(f64, f64)> = rtt_full.iter().map(|&v| (v, 1.0)).collect();
    let (mean_full, deciles_full) = weighted_deciles(&unit_weighted);

    StatsResult {
        general: GeneralStats {
            samples: window.samples,
            end_counter: window.current,
        },
        ping_drop,
        run_length: runs.finish(),
        latency: LatencyStats {
            mean_all_ping_latency: mean_all,
            deciles_all_ping_latency: deciles_all,
            mean_full_ping_latency: mean_full,
            deciles_full_ping_latency: deciles_full,
            stdev_full_ping_latency: population_stdev(&rtt_full),
        },
        loaded_latency: loaded_latency(rtt_buckets),
        usage: UsageStats {
            download_usage: (usage_down / 8.0).round_ties_even() as u64,
            upload_usage: (usage_up / 8.0).round_ties_even() as u64,
        },
    }
}
