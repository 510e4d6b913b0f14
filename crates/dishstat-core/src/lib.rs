//! # dishstat-core
//!
//! Turns the per-second telemetry history of a satellite dish into interval
//! statistics.
//!
//! The dish keeps its recent history in fixed-size ring buffers indexed by an
//! ever-increasing sample counter. This crate reads those buffers, works out
//! which samples are new since the last read, stitches consecutive reads into
//! one sequence (absorbing reboots and gaps), and reduces a window of samples
//! to ping-drop, outage run-length, latency and usage statistics.
//!
//! ## Quick Start
//!
//! ```
//! use dishstat_core::{HistorySnapshot, SampleLimit, history_stats};
//!
//! // A 4-slot ring after 6 samples: slots hold counters 4, 5, 2, 3.
//! let history = HistorySnapshot::ring(6, vec![0.0, 1.0, 0.0, 0.5]);
//! let stats = history_stats(&history, SampleLimit::All, Some(3));
//! assert_eq!(stats.general.samples, 3);
//! assert_eq!(stats.ping_drop.count_full_ping_drop, 1);
//! ```
//!
//! ## Architecture
//!
//! Gateway → Poller (window → stitch → stats) → field tables → output
//!
//! - [`gateway`]: one request/response exchange per operation, one reconnect
//!   attempt on a stale connection. The wire transport is a [`Connector`].
//! - [`window`]: which ring slots hold new samples.
//! - [`stitch`]: merge consecutive replies into a linear sequence.
//! - [`stats`]: the statistics engine.
//! - [`poll`]: the aggregation state machine across loop iterations.
//! - [`fields`]: named, typed columns for every reported record.

pub mod bulk;
pub mod config;
pub mod device;
pub mod error;
pub mod fields;
pub mod gateway;
pub mod history;
pub mod poll;
pub mod replay;
pub mod stats;
pub mod stitch;
pub mod window;

pub use bulk::{BulkGeneral, BulkHistory, bulk_history};
pub use config::{Mode, ModeSet, PollConfig};
pub use device::{
    AlertDetail, DISH_ALERTS, LocationRecord, ObstructionDetail, ObstructionMap, STATE_UNREACHABLE,
    StatusRecord,
};
pub use error::{DishError, Operation, Result};
pub use fields::{FieldRecord, FieldSpec, FieldValue, Shape, column_names};
pub use gateway::{
    CallFailure, Channel, Connector, DEFAULT_TARGET, DishGateway, REQUEST_TIMEOUT, RejectCode,
    Request, Response,
};
pub use history::{BufferLayout, HistoryField, HistorySnapshot};
pub use poll::{BulkReport, CycleOutcome, PollState, Poller, StatsReport, StatusReport, unix_now};
pub use replay::{ReplayConnector, ReplayEntry, RequestKind};
pub use stats::{
    GeneralStats, LatencyStats, LoadedLatencyStats, PingDropStats, RunLengthStats, StatsResult,
    UsageStats, history_stats, window_stats,
};
pub use stitch::{Discontinuity, Stitched, stitch};
pub use window::{SampleLimit, SampleWindow, WindowIndices, resolve_window};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
