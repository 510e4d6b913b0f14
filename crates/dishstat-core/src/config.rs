//! Poll configuration and data-group selection.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DishError, Result};
use crate::gateway::DEFAULT_TARGET;
use crate::window::SampleLimit;

/// A data group to record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Status,
    ObstructionDetail,
    AlertDetail,
    Location,
    PingDrop,
    PingRunLength,
    PingLatency,
    PingLoadedLatency,
    Usage,
    BulkHistory,
}

impl Mode {
    pub const ALL: [Mode; 10] = [
        Mode::Status,
        Mode::ObstructionDetail,
        Mode::AlertDetail,
        Mode::Location,
        Mode::PingDrop,
        Mode::PingRunLength,
        Mode::PingLatency,
        Mode::PingLoadedLatency,
        Mode::Usage,
        Mode::BulkHistory,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::ObstructionDetail => "obstruction_detail",
            Self::AlertDetail => "alert_detail",
            Self::Location => "location",
            Self::PingDrop => "ping_drop",
            Self::PingRunLength => "ping_run_length",
            Self::PingLatency => "ping_latency",
            Self::PingLoadedLatency => "ping_loaded_latency",
            Self::Usage => "usage",
            Self::BulkHistory => "bulk_history",
        }
    }

    /// Answered from the status (or location) request.
    pub fn is_status(self) -> bool {
        matches!(
            self,
            Self::Status | Self::ObstructionDetail | Self::AlertDetail | Self::Location
        )
    }

    /// Computed from aggregated history.
    pub fn is_history_stats(self) -> bool {
        matches!(
            self,
            Self::PingDrop
                | Self::PingRunLength
                | Self::PingLatency
                | Self::PingLoadedLatency
                | Self::Usage
        )
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Mode {
    type Err = DishError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.name() == s)
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(|m| m.name()).collect();
                DishError::Config(format!("unknown mode '{s}' (one of: {})", known.join(", ")))
            })
    }
}

/// Selected modes, without duplicates, in selection order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Mode>", into = "Vec<Mode>")]
pub struct ModeSet(Vec<Mode>);

impl From<Vec<Mode>> for ModeSet {
    fn from(modes: Vec<Mode>) -> Self {
        modes.into_iter().collect()
    }
}

impl From<ModeSet> for Vec<Mode> {
    fn from(set: ModeSet) -> Self {
        set.0
    }
}

impl FromIterator<Mode> for ModeSet {
    fn from_iter<I: IntoIterator<Item = Mode>>(iter: I) -> Self {
        let mut modes = Vec::new();
        for mode in iter {
            if !modes.contains(&mode) {
                modes.push(mode);
            }
        }
        Self(modes)
    }
}

impl ModeSet {
    pub fn contains(&self, mode: Mode) -> bool {
        self.0.contains(&mode)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Mode> + '_ {
        self.0.iter().copied()
    }

    /// Any status-group mode, location included.
    pub fn status_mode(&self) -> bool {
        self.iter().any(Mode::is_status)
    }

    /// A mode that needs the status request itself (location does not).
    pub fn pure_status_mode(&self) -> bool {
        self.iter().any(|m| m.is_status() && m != Mode::Location)
    }

    pub fn history_stats_mode(&self) -> bool {
        self.iter().any(Mode::is_history_stats)
    }

    pub fn bulk_mode(&self) -> bool {
        self.contains(Mode::BulkHistory)
    }
}

/// Settings for a polling run.
///
/// Loaded from JSON with [`PollConfig::load`]; every key is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// `host:port` of the dish.
    pub target: String,
    /// Seconds between iterations; zero or less runs a single iteration.
    pub loop_interval: f64,
    /// Iterations merged into one statistics record.
    pub poll_loops: Option<u32>,
    /// Samples to read when no resume counter is known.
    pub samples: Option<SampleLimit>,
    /// Resume each statistics window at the previous end counter.
    pub track_counter: bool,
    pub modes: ModeSet,
    /// Booleans as `1`/`0`.
    pub numeric: bool,
    /// Labelled text output instead of CSV.
    pub verbose: bool,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            target: DEFAULT_TARGET.to_string(),
            loop_interval: 0.0,
            poll_loops: None,
            samples: None,
            track_counter: true,
            modes: ModeSet::default(),
            numeric: false,
            verbose: false,
        }
    }
}

impl PollConfig {
    /// Read a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        log::debug!("loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn is_looping(&self) -> bool {
        self.loop_interval > 0.0
    }

    /// Loop period, or `None` for a single iteration.
    pub fn interval(&self) -> Option<Duration> {
        if !self.is_looping() {
            return None;
        }
        Duration::try_from_secs_f64(self.loop_interval).ok()
    }

    /// Effective iterations per statistics record.
    pub fn poll_loops(&self) -> u32 {
        if self.is_looping() {
            self.poll_loops.unwrap_or(1).max(1)
        } else {
            1
        }
    }

    /// Window size for statistics when no resume counter is known:
    /// the configured value, else one loop interval's worth of samples.
    pub fn stats_limit(&self) -> SampleLimit {
        self.samples.unwrap_or(if self.loop_interval >= 1.0 {
            SampleLimit::Count(self.loop_interval.trunc() as u64)
        } else {
            SampleLimit::All
        })
    }

    /// Window size for the first bulk read.
    pub fn bulk_limit(&self) -> SampleLimit {
        self.samples.unwrap_or(SampleLimit::All)
    }

    /// Reject combinations that cannot produce a consistent output.
    pub fn validate(&self) -> Result<()> {
        if self.modes.is_empty() {
            return Err(DishError::Config("no modes selected".into()));
        }
        if self.loop_interval.is_nan() {
            return Err(DishError::Config("loop interval is not a number".into()));
        }
        if self.is_looping() && Duration::try_from_secs_f64(self.loop_interval).is_err() {
            return Err(DishError::Config(format!(
                "loop interval {} is out of range",
                self.loop_interval
            )));
        }
        if self.is_looping()
            && let Some(loops) = self.poll_loops
            && loops < 2
        {
            return Err(DishError::Config(
                "poll loops must be 2 or greater to be meaningful".into(),
            ));
        }
        if self.verbose {
            return Ok(());
        }
        let modes = &self.modes;
        if modes.bulk_mode() && (modes.status_mode() || modes.history_stats_mode()) {
            return Err(DishError::Config(
                "bulk_history cannot be combined with other modes for CSV output".into(),
            ));
        }
        if modes.history_stats_mode() && modes.status_mode() && self.poll_loops() > 1 {
            return Err(DishError::Config(
                "poll loops with history stats modes cannot be mixed with status modes for CSV output"
                    .into(),
            ));
        }
        Ok(())
    }
}
