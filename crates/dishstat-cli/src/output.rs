//! CSV and labelled-text rendering of poll results.

use std::fs::{File, OpenOptions};
use std::io::{self, LineWriter, Write};
use std::path::Path;

use dishstat_core::{
    AlertDetail, BulkHistory, BulkReport, FieldRecord, FieldSpec, FieldValue, GeneralStats,
    LatencyStats, LoadedLatencyStats, LocationRecord, Mode, ModeSet, ObstructionDetail,
    PingDropStats, RunLengthStats, StatsResult, StatusRecord, UsageStats, column_names,
};

/// First column of every CSV row.
pub const TIMESTAMP_COLUMN: &str = "datetimestamp_utc";

/// Column holding the sample counter a statistics row ends at.
pub const COUNTER_COLUMN: &str = "end_counter";

/// Width of the label column in verbose output.
const LABEL_WIDTH: usize = 22;

fn verbose_label(name: &str) -> &str {
    match name {
        "alerts" => "Alerts bit field",
        "samples" => "Parsed samples",
        "end_counter" => "Sample counter",
        "total_ping_drop" => "Total ping drop",
        "count_full_ping_drop" => "Count of drop == 1",
        "count_obstructed" => "Obstructed",
        "total_obstructed_ping_drop" => "Obstructed ping drop",
        "count_full_obstructed_ping_drop" => "Obstructed drop == 1",
        "count_unscheduled" => "Unscheduled",
        "total_unscheduled_ping_drop" => "Unscheduled ping drop",
        "count_full_unscheduled_ping_drop" => "Unscheduled drop == 1",
        "init_run_fragment" => "Initial drop run fragment",
        "final_run_fragment" => "Final drop run fragment",
        "run_seconds" => "Per-second drop runs",
        "run_minutes" => "Per-minute drop runs",
        "mean_all_ping_latency" => "Mean RTT, drop < 1",
        "deciles_all_ping_latency" => "RTT deciles, drop < 1",
        "mean_full_ping_latency" => "Mean RTT, drop == 0",
        "deciles_full_ping_latency" => "RTT deciles, drop == 0",
        "stdev_full_ping_latency" => "RTT standard deviation, drop == 0",
        "download_usage" => "Bytes downloaded",
        "upload_usage" => "Bytes uploaded",
        other => other,
    }
}

fn labelled(label: &str, value: &str) -> String {
    format!("{:width$} {value}", format!("{label}:"), width = LABEL_WIDTH)
}

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

/// Format UNIX seconds as `YYYY-MM-DDTHH:MM:SS` (UTC, no zone suffix).
pub fn format_timestamp(secs: i64) -> String {
    let (year, month, day, hour, min, sec) = secs_to_utc(secs.max(0) as u64);
    format!("{year:04}-{month:02}-{day:02}T{hour:02}:{min:02}:{sec:02}")
}

/// Convert seconds since the UNIX epoch to (year, month, day, hour, minute, second).
/// No leap second handling.
fn secs_to_utc(secs: u64) -> (u64, u64, u64, u64, u64, u64) {
    let sec = secs % 60;
    let min = (secs / 60) % 60;
    let hour = (secs / 3600) % 24;

    let mut days = secs / 86400;
    let mut year = 1970u64;
    loop {
        let days_in_year = if is_leap(year) { 366 } else { 365 };
        if days < days_in_year {
            break;
        }
        days -= days_in_year;
        year += 1;
    }

    let february = if is_leap(year) { 29 } else { 28 };
    let months_days: [u64; 12] = [31, february, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];
    let mut month = 12u64;
    for (i, &md) in months_days.iter().enumerate() {
        if days < md {
            month = i as u64 + 1;
            break;
        }
        days -= md;
    }
    (year, month, days + 1, hour, min, sec)
}

fn is_leap(y: u64) -> bool {
    (y.is_multiple_of(4) && !y.is_multiple_of(100)) || y.is_multiple_of(400)
}

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

/// CSV column names for the selected modes, timestamp first.
pub fn header(modes: &ModeSet) -> Vec<String> {
    let mut schema: Vec<FieldSpec> = Vec::new();
    if modes.contains(Mode::Status) {
        schema.extend(StatusRecord::schema());
    }
    if modes.contains(Mode::ObstructionDetail) {
        schema.extend(ObstructionDetail::schema());
    }
    if modes.contains(Mode::AlertDetail) {
        schema.extend(AlertDetail::schema());
    }
    if modes.contains(Mode::Location) {
        schema.extend(LocationRecord::schema());
    }

    let mut names = vec![TIMESTAMP_COLUMN.to_string()];
    names.extend(column_names(&schema));
    if modes.bulk_mode() {
        names.extend(BulkHistory::FIELD_NAMES.iter().map(|n| n.to_string()));
    }
    if modes.history_stats_mode() {
        names.extend(column_names(&stats_schema(modes)));
    }
    names
}

fn stats_schema(modes: &ModeSet) -> Vec<FieldSpec> {
    let mut schema = GeneralStats::schema();
    if modes.contains(Mode::PingDrop) {
        schema.extend(PingDropStats::schema());
    }
    if modes.contains(Mode::PingRunLength) {
        schema.extend(RunLengthStats::schema());
    }
    if modes.contains(Mode::PingLatency) {
        schema.extend(LatencyStats::schema());
    }
    if modes.contains(Mode::PingLoadedLatency) {
        schema.extend(LoadedLatencyStats::schema());
    }
    if modes.contains(Mode::Usage) {
        schema.extend(UsageStats::schema());
    }
    schema
}

// ---------------------------------------------------------------------------
// One output line
// ---------------------------------------------------------------------------

/// Field groups gathered during one loop iteration.
#[derive(Debug, Default)]
pub struct Line {
    groups: Vec<(FieldSpec, Vec<FieldValue>)>,
}

impl Line {
    pub fn push<R: FieldRecord>(&mut self, record: &R) {
        self.groups.extend(record.grouped());
    }

    /// Add the statistics groups selected by `modes`.
    pub fn push_stats(&mut self, result: &StatsResult, modes: &ModeSet) {
        self.push(&result.general);
        if modes.contains(Mode::PingDrop) {
            self.push(&result.ping_drop);
        }
        if modes.contains(Mode::PingRunLength) {
            self.push(&result.run_length);
        }
        if modes.contains(Mode::PingLatency) {
            self.push(&result.latency);
        }
        if modes.contains(Mode::PingLoadedLatency) {
            self.push(&result.loaded_latency);
        }
        if modes.contains(Mode::Usage) {
            self.push(&result.usage);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// One CSV row led by the timestamp.
    pub fn to_csv(&self, timestamp: i64, numeric: bool) -> String {
        let mut cells = vec![format_timestamp(timestamp)];
        for (_, values) in &self.groups {
            cells.extend(values.iter().map(|v| v.render(numeric)));
        }
        cells.join(",")
    }

    /// One `label: value` line per field; sequences on a single line.
    pub fn to_verbose(&self, numeric: bool) -> String {
        self.groups
            .iter()
            .map(|(spec, values)| {
                let rendered: Vec<String> = values.iter().map(|v| v.render(numeric)).collect();
                labelled(verbose_label(&spec.name), &rendered.join(", "))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// ---------------------------------------------------------------------------
// Bulk history
// ---------------------------------------------------------------------------

/// One CSV row per sample, each a second after the previous.
pub fn bulk_csv(report: &BulkReport, numeric: bool) -> Vec<String> {
    (0..report.history.len())
        .map(|i| {
            let mut cells = vec![format_timestamp(report.time_base + i as i64 + 1)];
            cells.extend(report.history.row(i).iter().map(|v| v.render(numeric)));
            cells.join(",")
        })
        .collect()
}

/// Time range followed by one line per column.
pub fn bulk_verbose(report: &BulkReport, numeric: bool) -> String {
    let count = report.history.len() as i64;
    let mut lines = vec![labelled(
        "Time range (UTC)",
        &format!(
            "{} -> {}",
            format_timestamp(report.time_base),
            format_timestamp(report.time_base + count)
        ),
    )];
    for (name, values) in report.history.columns() {
        let rendered: Vec<String> = values.iter().map(|v| v.render(numeric)).collect();
        lines.push(labelled(name, &rendered.join(", ")));
    }
    lines.join("\n")
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

/// Append to `path`, or write to stdout when no path is given.
pub fn open_output(path: Option<&Path>) -> io::Result<Box<dyn Write>> {
    match path {
        Some(path) => {
            let file: File = OpenOptions::new().create(true).append(true).open(path)?;
            Ok(Box::new(LineWriter::new(file)))
        }
        None => Ok(Box::new(io::stdout())),
    }
}

/// Sample counter recorded on the last row of an existing CSV file.
///
/// Any read or parse failure means no counter.
pub fn prior_counter(path: &Path) -> Option<u64> {
    let text = std::fs::read_to_string(path).ok()?;
    let mut lines = text.lines();
    let column = lines
        .next()?
        .split(',')
        .position(|name| name.trim() == COUNTER_COLUMN)?;
    let last = lines.last()?;
    last.split(',').nth(column)?.trim().parse().ok()
}
