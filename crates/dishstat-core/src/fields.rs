//! Named, typed field tables for every reported record.
//!
//! Each record declares its fields once ([`FieldRecord::schema`]) and yields
//! its values in the same order ([`FieldRecord::values`]). Sequence fields
//! expand to one column per element, `name_i`, with `i` counting from the
//! field's start index.

use std::fmt;

use crate::device::{
    AlertDetail, DISH_ALERTS, LocationRecord, ObstructionDetail, StatusRecord, WEDGE_COUNT,
};
use crate::stats::{
    DECILE_MARKERS, GeneralStats, LOAD_BUCKETS, LatencyStats, LoadedLatencyStats, PingDropStats,
    RUN_BUCKETS, RunLengthStats, UsageStats,
};

/// One reported value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Int(u64),
    Float(f64),
    Bool(bool),
    Text(String),
    /// No value: unknown, not reported, or not applicable.
    None,
}

impl FieldValue {
    /// Render for output. `numeric` writes booleans as `1`/`0`.
    pub fn render(&self, numeric: bool) -> String {
        match self {
            Self::Int(v) => v.to_string(),
            Self::Float(v) => format!("{v:?}"),
            Self::Bool(v) if numeric => u8::from(*v).to_string(),
            Self::Bool(true) => "True".to_string(),
            Self::Bool(false) => "False".to_string(),
            Self::Text(s) => s.clone(),
            Self::None => String::new(),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render(false))
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::None, Into::into)
    }
}

/// Scalar or sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Scalar,
    Sequence { start: usize, len: usize },
}

/// Declared field of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub shape: Shape,
}

impl FieldSpec {
    pub fn scalar(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shape: Shape::Scalar,
        }
    }

    pub fn sequence(name: impl Into<String>, start: usize, len: usize) -> Self {
        Self {
            name: name.into(),
            shape: Shape::Sequence { start, len },
        }
    }

    /// Number of values (and columns) this field occupies.
    pub fn width(&self) -> usize {
        match self.shape {
            Shape::Scalar => 1,
            Shape::Sequence { len, .. } => len,
        }
    }

    pub fn column_names(&self) -> Vec<String> {
        match self.shape {
            Shape::Scalar => vec![self.name.clone()],
            Shape::Sequence { start, len } => (start..start + len)
                .map(|i| format!("{}_{i}", self.name))
                .collect(),
        }
    }
}

/// Column names for a whole schema.
pub fn column_names(schema: &[FieldSpec]) -> Vec<String> {
    schema.iter().flat_map(FieldSpec::column_names).collect()
}

/// A record with a fixed field table.
pub trait FieldRecord {
    fn schema() -> Vec<FieldSpec>;

    /// Flattened values, one per column, in schema order.
    fn values(&self) -> Vec<FieldValue>;

    /// Values grouped by field.
    fn grouped(&self) -> Vec<(FieldSpec, Vec<FieldValue>)> {
        let mut values = self.values().into_iter();
        Self::schema()
            .into_iter()
            .map(|spec| {
                let group: Vec<FieldValue> = values.by_ref().take(spec.width()).collect();
                (spec, group)
            })
            .collect()
    }
}

fn seq<T: Copy + Into<FieldValue>>(values: &[T]) -> impl Iterator<Item = FieldValue> + '_ {
    values.iter().map(|&v| v.into())
}

// ---------------------------------------------------------------------------
// Status group
// ---------------------------------------------------------------------------

impl FieldRecord for StatusRecord {
    fn schema() -> Vec<FieldSpec> {
        [
            "id",
            "hardware_version",
            "software_version",
            "state",
            "uptime",
            "snr",
            "seconds_to_first_nonempty_slot",
            "pop_ping_drop_rate",
            "downlink_throughput_bps",
            "uplink_throughput_bps",
            "pop_ping_latency_ms",
            "alerts",
            "fraction_obstructed",
            "currently_obstructed",
            "seconds_obstructed",
            "obstruction_duration",
            "obstruction_interval",
            "direction_azimuth",
            "direction_elevation",
            "is_snr_above_noise_floor",
        ]
        .into_iter()
        .map(FieldSpec::scalar)
        .collect()
    }

    fn values(&self) -> Vec<FieldValue> {
        vec![
            self.id.clone().into(),
            self.hardware_version.clone().into(),
            self.software_version.clone().into(),
            self.state.as_str().into(),
            self.uptime.into(),
            self.snr.into(),
            self.seconds_to_first_nonempty_slot.into(),
            self.pop_ping_drop_rate.into(),
            self.downlink_throughput_bps.into(),
            self.uplink_throughput_bps.into(),
            self.pop_ping_latency_ms.into(),
            self.alerts.into(),
            self.fraction_obstructed.into(),
            self.currently_obstructed.into(),
            self.seconds_obstructed.into(),
            self.obstruction_duration.into(),
            self.obstruction_interval.into(),
            self.direction_azimuth.into(),
            self.direction_elevation.into(),
            self.is_snr_above_noise_floor.into(),
        ]
    }
}

impl FieldRecord for ObstructionDetail {
    fn schema() -> Vec<FieldSpec> {
        vec![
            FieldSpec::sequence("wedges_fraction_obstructed", 0, WEDGE_COUNT),
            FieldSpec::sequence("raw_wedges_fraction_obstructed", 0, WEDGE_COUNT),
            FieldSpec::scalar("valid_s"),
        ]
    }

    fn values(&self) -> Vec<FieldValue> {
        seq(&self.wedges_fraction_obstructed)
            .chain(seq(&self.raw_wedges_fraction_obstructed))
            .chain([FieldValue::from(self.valid_s)])
            .collect()
    }
}

impl FieldRecord for AlertDetail {
    fn schema() -> Vec<FieldSpec> {
        DISH_ALERTS
            .iter()
            .map(|(name, _)| FieldSpec::scalar(format!("alert_{name}")))
            .collect()
    }

    fn values(&self) -> Vec<FieldValue> {
        self.alerts.iter().map(|&(_, active)| active.into()).collect()
    }
}

impl FieldRecord for LocationRecord {
    fn schema() -> Vec<FieldSpec> {
        ["latitude", "longitude", "altitude"]
            .into_iter()
            .map(FieldSpec::scalar)
            .collect()
    }

    fn values(&self) -> Vec<FieldValue> {
        vec![
            self.latitude.into(),
            self.longitude.into(),
            self.altitude.into(),
        ]
    }
}

// ---------------------------------------------------------------------------
// History statistics group
// ---------------------------------------------------------------------------

impl FieldRecord for GeneralStats {
    fn schema() -> Vec<FieldSpec> {
        vec![FieldSpec::scalar("samples"), FieldSpec::scalar("end_counter")]
    }

    fn values(&self) -> Vec<FieldValue> {
        vec![self.samples.into(), self.end_counter.into()]
    }
}

impl FieldRecord for PingDropStats {
    fn schema() -> Vec<FieldSpec> {
        [
            "total_ping_drop",
            "count_full_ping_drop",
            "count_obstructed",
            "total_obstructed_ping_drop",
            "count_full_obstructed_ping_drop",
            "count_unscheduled",
            "total_unscheduled_ping_drop",
            "count_full_unscheduled_ping_drop",
        ]
        .into_iter()
        .map(FieldSpec::scalar)
        .collect()
    }

    fn values(&self) -> Vec<FieldValue> {
        vec![
            self.total_ping_drop.into(),
            self.count_full_ping_drop.into(),
            self.count_obstructed.into(),
            self.total_obstructed_ping_drop.into(),
            self.count_full_obstructed_ping_drop.into(),
            self.count_unscheduled.into(),
            self.total_unscheduled_ping_drop.into(),
            self.count_full_unscheduled_ping_drop.into(),
        ]
    }
}

impl FieldRecord for RunLengthStats {
    fn schema() -> Vec<FieldSpec> {
        vec![
            FieldSpec::scalar("init_run_fragment"),
            FieldSpec::scalar("final_run_fragment"),
            FieldSpec::sequence("run_seconds", 1, RUN_BUCKETS),
            FieldSpec::sequence("run_minutes", 1, RUN_BUCKETS),
        ]
    }

    fn values(&self) -> Vec<FieldValue> {
        [
            FieldValue::from(self.init_run_fragment),
            FieldValue::from(self.final_run_fragment),
        ]
            .into_iter()
            .chain(seq(&self.run_seconds))
            .chain(seq(&self.run_minutes))
            .collect()
    }
}

impl FieldRecord for LatencyStats {
    fn schema() -> Vec<FieldSpec> {
        vec![
            FieldSpec::scalar("mean_all_ping_latency"),
            FieldSpec::sequence("deciles_all_ping_latency", 0, DECILE_MARKERS),
            FieldSpec::scalar("mean_full_ping_latency"),
            FieldSpec::sequence("deciles_full_ping_latency", 0, DECILE_MARKERS),
            FieldSpec::scalar("stdev_full_ping_latency"),
        ]
    }

    fn values(&self) -> Vec<FieldValue> {
        std::iter::once(FieldValue::from(self.mean_all_ping_latency))
            .chain(seq(&self.deciles_all_ping_latency))
            .chain([FieldValue::from(self.mean_full_ping_latency)])
            .chain(seq(&self.deciles_full_ping_latency))
            .chain([FieldValue::from(self.stdev_full_ping_latency)])
            .collect()
    }
}

impl FieldRecord for LoadedLatencyStats {
    fn schema() -> Vec<FieldSpec> {
        vec![
            FieldSpec::sequence("load_bucket_samples", 0, LOAD_BUCKETS),
            FieldSpec::sequence("load_bucket_min_latency", 0, LOAD_BUCKETS),
            FieldSpec::sequence("load_bucket_median_latency", 0, LOAD_BUCKETS),
            FieldSpec::sequence("load_bucket_max_latency", 0, LOAD_BUCKETS),
        ]
    }

    fn values(&self) -> Vec<FieldValue> {
        seq(&self.load_bucket_samples)
            .chain(seq(&self.load_bucket_min_latency))
            .chain(seq(&self.load_bucket_median_latency))
            .chain(seq(&self.load_bucket_max_latency))
            .collect()
    }
}

impl FieldRecord for UsageStats {
    fn schema() -> Vec<FieldSpec> {
        vec![
            FieldSpec::scalar("download_usage"),
            FieldSpec::scalar("upload_usage"),
        ]
    }

    fn values(&self) -> Vec<FieldValue> {
        vec![self.download_usage.into(), self.upload_usage.into()]
    }
}
