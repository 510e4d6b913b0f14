//! Poll loop state: history aggregation across iterations, status polling
//! and the bulk-history time base.
//!
//! A [`Poller`] is driven one iteration at a time by its owner. It holds the
//! gateway (and so the single dish connection) plus all state that survives
//! between iterations. Nothing here is shared across threads.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::bulk::{BulkGeneral, BulkHistory, bulk_history};
use crate::config::{Mode, PollConfig};
use crate::device::{AlertDetail, LocationRecord, ObstructionDetail, StatusRecord};
use crate::error::{DishError, Result};
use crate::gateway::{Connector, DishGateway};
use crate::history::HistorySnapshot;
use crate::stats::{StatsResult, history_stats};
use crate::stitch::{Discontinuity, stitch};
use crate::window::SampleLimit;

/// Seconds of slack allowed between the bulk time base and the clock.
const TIME_SYNC_SLACK_S: f64 = 2.0;

/// Wall-clock seconds since the UNIX epoch.
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Statistics for one completed aggregation cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsReport {
    pub result: StatsResult,
    /// Reboots and gaps absorbed while stitching this cycle's history.
    pub discontinuities: Vec<Discontinuity>,
    /// UNIX time of the cycle's most recent successful history fetch.
    pub timestamp: i64,
}

/// What one call to [`Poller::poll_stats`] produced.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// History was (or failed to be) accumulated; more iterations needed.
    Accumulating,
    Ready(StatsReport),
    /// Flush with nothing pending.
    Idle,
}

/// Status-group data for one iteration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StatusReport {
    pub timestamp: i64,
    pub status: Option<StatusRecord>,
    pub obstruction_detail: Option<ObstructionDetail>,
    pub alert_detail: Option<AlertDetail>,
    pub location: Option<LocationRecord>,
}

impl StatusReport {
    /// The dish did not answer and only the placeholder state was recorded.
    pub fn is_unreachable(&self) -> bool {
        self.status.as_ref().is_some_and(StatusRecord::is_unreachable)
    }
}

/// Samples from one bulk read, with their time placement.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkReport {
    pub general: BulkGeneral,
    pub history: BulkHistory,
    /// UNIX time of the sample *before* the first one; sample `i` was taken
    /// at `time_base + i + 1`.
    pub time_base: i64,
    /// Counter of the first sample.
    pub first_counter: u64,
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Everything that persists between iterations.
#[derive(Debug, Clone)]
pub struct PollState {
    /// Resume counter for history statistics.
    pub counter_stats: Option<u64>,
    /// Resume counter for bulk history.
    pub counter_bulk: Option<u64>,
    /// UNIX time of the sample following the last bulk sample emitted.
    pub bulk_time_base: Option<i64>,
    pub dish_id: Option<String>,
    accumulated: Option<HistorySnapshot>,
    merged: bool,
    discontinuities: Vec<Discontinuity>,
    fetch_timestamp: Option<i64>,
    poll_count: u32,
    first_poll: bool,
    warned_location: bool,
}

impl Default for PollState {
    fn default() -> Self {
        Self {
            counter_stats: None,
            counter_bulk: None,
            bulk_time_base: None,
            dish_id: None,
            accumulated: None,
            merged: false,
            discontinuities: Vec::new(),
            fetch_timestamp: None,
            poll_count: 0,
            first_poll: true,
            warned_location: false,
        }
    }
}

impl PollState {
    /// Iterations completed in the current aggregation cycle.
    pub fn poll_count(&self) -> u32 {
        self.poll_count
    }

    pub fn has_pending(&self) -> bool {
        self.accumulated.is_some()
    }

    /// Window for the pending accumulation: a stitched sequence is read in
    /// full, otherwise resume at the counter or fall back to `limit`.
    fn window_params(&self, limit: SampleLimit) -> (SampleLimit, Option<u64>) {
        if self.merged {
            (SampleLimit::All, None)
        } else if let Some(counter) = self.counter_stats {
            (SampleLimit::All, Some(counter))
        } else {
            (limit, None)
        }
    }

    /// Fold a fetch result into the pending accumulation.
    fn accumulate(&mut self, fetched: Option<HistorySnapshot>, limit: SampleLimit) {
        let (limit, start) = self.window_params(limit);
        self.accumulated = match (self.accumulated.take(), fetched) {
            (Some(previous), Some(new)) => {
                let stitched = stitch(previous, Some(&new), limit, start);
                self.discontinuities.extend(stitched.discontinuity);
                self.merged = true;
                Some(stitched.history)
            }
            (Some(previous), None) => Some(previous),
            (None, fetched) => fetched,
        };
    }

    /// On the first accumulation of a run, count the samples elapsed since
    /// the resume counter as already-completed iterations.
    fn bootstrap(&mut self, poll_loops: u32, interval_s: f64) {
        if !self.first_poll {
            return;
        }
        let Some(acc) = self.accumulated.as_ref() else {
            return;
        };
        self.first_poll = false;
        let Some(resume) = self.counter_stats else {
            return;
        };
        if poll_loops < 2 || interval_s <= 0.0 {
            return;
        }
        let elapsed = if acc.current >= resume {
            acc.current - resume
        } else {
            acc.current
        };
        let elapsed = elapsed.min(acc.stored_len() as u64);
        let estimate = ((elapsed as f64 - 1.0) / interval_s).trunc();
        if estimate > 0.0 {
            let estimate = estimate.min(f64::from(u32::MAX)) as u32;
            log::debug!("resuming {elapsed} samples after counter {resume}: {estimate} polls done");
            self.poll_count = self.poll_count.max(estimate);
        }
    }

    /// Time base for a bulk read of `samples` ending at `new_counter`,
    /// fetched between `before` and `after`.
    ///
    /// The previous base is kept while the counter advances exactly by the
    /// samples read and the implied end time stays near the clock.
    fn place_bulk(&mut self, samples: u64, new_counter: u64, before: f64, after: f64) -> i64 {
        let mut base = self.bulk_time_base;
        if let Some(previous) = self.counter_bulk
            && new_counter != previous + samples
        {
            base = None;
        }
        if let Some(b) = base {
            let end = (b + samples as i64) as f64;
            if end < before - TIME_SYNC_SLACK_S || end > after + TIME_SYNC_SLACK_S {
                log::info!("lost sample time sync at {}", b + samples as i64);
                base = None;
            }
        }
        let base = base.unwrap_or_else(|| {
            let now = before.trunc() as i64;
            log::info!("establishing new time base: counter {new_counter} -> {now}");
            now - samples as i64
        });
        self.counter_bulk = Some(new_counter);
        self.bulk_time_base = Some(base + samples as i64);
        base
    }
}

// ---------------------------------------------------------------------------
// Poller
// ---------------------------------------------------------------------------

/// Drives polling iterations against one dish.
pub struct Poller<C: Connector> {
    gateway: DishGateway<C>,
    config: PollConfig,
    state: PollState,
    clock: fn() -> f64,
}

impl<C: Connector> Poller<C> {
    pub fn new(gateway: DishGateway<C>, config: PollConfig) -> Self {
        Self {
            gateway,
            config,
            state: PollState::default(),
            clock: unix_now,
        }
    }

    /// Replace the wall clock (seconds since the epoch).
    pub fn with_clock(mut self, clock: fn() -> f64) -> Self {
        self.clock = clock;
        self
    }

    /// Start statistics at this counter instead of the sample limit.
    pub fn resume_from(&mut self, counter: Option<u64>) {
        self.state.counter_stats = counter;
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    pub fn state(&self) -> &PollState {
        &self.state
    }

    pub fn gateway_mut(&mut self) -> &mut DishGateway<C> {
        &mut self.gateway
    }

    fn now(&self) -> i64 {
        (self.clock)() as i64
    }

    /// Device identifier, fetched once and cached.
    pub fn device_id(&mut self) -> Result<&str> {
        if self.state.dish_id.is_none() {
            self.state.dish_id = Some(self.gateway.device_id()?);
        }
        Ok(self.state.dish_id.as_deref().unwrap_or_default())
    }

    /// Query the status-group modes.
    ///
    /// An unanswered status request is recorded as the `DISH_UNREACHABLE`
    /// state when the `status` mode is selected, and is an error otherwise.
    pub fn poll_status(&mut self) -> Result<StatusReport> {
        let modes = self.config.modes.clone();
        let mut report = StatusReport {
            timestamp: self.now(),
            ..StatusReport::default()
        };

        if modes.pure_status_mode() {
            match self.gateway.status() {
                Ok((status, obstruction, alerts)) => {
                    if status.id.is_some() {
                        self.state.dish_id.clone_from(&status.id);
                    }
                    if modes.contains(Mode::Status) {
                        report.status = Some(status);
                    }
                    if modes.contains(Mode::ObstructionDetail) {
                        report.obstruction_detail = Some(obstruction);
                    }
                    if modes.contains(Mode::AlertDetail) {
                        report.alert_detail = Some(alerts);
                    }
                }
                Err(e) if modes.contains(Mode::Status) && e.is_remote() => {
                    log::info!("dish unreachable: {e}");
                    report.status = Some(StatusRecord::unreachable());
                    return Ok(report);
                }
                Err(e) => return Err(e),
            }
        }

        if modes.contains(Mode::Location) {
            let location = self.gateway.location()?;
            if location.is_disabled() && !self.state.warned_location {
                log::warn!("location data not enabled on the dish");
                self.state.warned_location = true;
            }
            report.location = Some(location);
        }
        Ok(report)
    }

    /// Run one aggregation iteration. With `flush`, no history is fetched
    /// and any pending accumulation is computed immediately.
    pub fn poll_stats(&mut self, flush: bool) -> Result<CycleOutcome> {
        let poll_loops = self.config.poll_loops();
        if flush && poll_loops < 2 {
            return Ok(CycleOutcome::Idle);
        }

        let fetched = if flush {
            None
        } else {
            let timestamp = self.now();
            match self.gateway.history() {
                Ok(history) => {
                    self.state.fetch_timestamp = Some(timestamp);
                    Some(history)
                }
                Err(e) => {
                    log::warn!("failure getting history: {e}");
                    None
                }
            }
        };

        let limit = self.config.stats_limit();
        self.state.accumulate(fetched, limit);
        self.state.bootstrap(poll_loops, self.config.loop_interval);

        if self.state.poll_count + 1 < poll_loops && !flush {
            self.state.poll_count += 1;
            return Ok(CycleOutcome::Accumulating);
        }
        self.state.poll_count = 0;

        let (limit, start) = self.state.window_params(limit);
        let discontinuities = std::mem::take(&mut self.state.discontinuities);
        self.state.merged = false;
        let Some(history) = self.state.accumulated.take() else {
            return if flush {
                Ok(CycleOutcome::Idle)
            } else {
                Err(DishError::NoHistory)
            };
        };

        let result = history_stats(&history, limit, start);
        if self.config.track_counter {
            self.state.counter_stats = result.general.end_counter;
        }
        let timestamp = self
            .state
            .fetch_timestamp
            .take()
            .unwrap_or_else(|| self.now());
        Ok(CycleOutcome::Ready(StatsReport {
            result,
            discontinuities,
            timestamp,
        }))
    }

    /// Read the history samples written since the previous bulk read.
    pub fn poll_bulk(&mut self) -> Result<BulkReport> {
        let before = (self.clock)();
        let start = self.state.counter_bulk;
        let limit = match start {
            Some(_) => SampleLimit::All,
            None => self.config.bulk_limit(),
        };
        let history = self.gateway.history()?;
        let (general, bulk) = bulk_history(&history, limit, start);
        let after = (self.clock)();

        let time_base = self
            .state
            .place_bulk(general.samples, general.end_counter, before, after);
        Ok(BulkReport {
            general,
            history: bulk,
            time_base,
            first_counter: general.end_counter - general.samples,
        })
    }

    /// Close the dish connection.
    pub fn shutdown(&mut self) {
        self.gateway.close();
    }
}
