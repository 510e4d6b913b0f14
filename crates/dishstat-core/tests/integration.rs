//! Integration tests for dishstat-core.
//!
//! A simulated dish writes a deterministic per-second timeline into a ring
//! buffer; the tests drive the full pipeline against it:
//! gateway → poller → window/stitch → statistics → field tables.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use dishstat_core::{
    CallFailure, Channel, Connector, CycleOutcome, DishGateway, Discontinuity, FieldRecord,
    HistoryField, HistorySnapshot, Mode, ModeSet, PollConfig, Poller, ReplayConnector, Request,
    Response, RunLengthStats, SampleLimit, StatsReport, column_names, history_stats,
};

/// Drop ratio of the sample with counter `c`: a 3-second full outage every
/// 20 seconds, otherwise clean.
fn drop_at(c: u64) -> f64 {
    if c % 20 < 3 { 1.0 } else { 0.0 }
}

fn latency_at(c: u64) -> f64 {
    20.0 + (c % 7) as f64
}

#[derive(Debug)]
struct Dish {
    capacity: usize,
    counter: u64,
    /// Counter offset of the current boot; samples before it are lost.
    boot_at: u64,
    fail_next: bool,
}

impl Dish {
    fn advance(&mut self, seconds: u64) {
        self.counter += seconds;
    }

    fn reboot(&mut self) {
        self.boot_at += self.counter;
        self.counter = 0;
    }

    fn snapshot(&self) -> HistorySnapshot {
        let cap = self.capacity as u64;
        let mut drops = vec![0.0; self.capacity];
        let mut latency = vec![0.0; self.capacity];
        let mut down = vec![0.0; self.capacity];
        for c in self.counter.saturating_sub(cap)..self.counter {
            let slot = (c % cap) as usize;
            let t = self.boot_at + c;
            drops[slot] = drop_at(t);
            latency[slot] = latency_at(t);
            down[slot] = 8_000.0;
        }
        HistorySnapshot::ring(self.counter, drops)
            .with_field(HistoryField::PopPingLatencyMs, latency)
            .with_field(HistoryField::DownlinkThroughputBps, down)
            .with_field(HistoryField::UplinkThroughputBps, vec![0.0; self.capacity])
    }
}

struct SimChannel(Rc<RefCell<Dish>>);

impl Channel for SimChannel {
    fn call(&mut self, request: &Request, _timeout: Duration) -> Result<Response, CallFailure> {
        let mut dish = self.0.borrow_mut();
        if dish.fail_next {
            dish.fail_next = false;
            return Err(CallFailure::Transport);
        }
        match request {
            Request::GetHistory => Ok(Response::History(dish.snapshot())),
            _ => Ok(Response::Empty),
        }
    }

    fn close(&mut self) {}
}

#[derive(Clone)]
struct SimConnector(Rc<RefCell<Dish>>);

impl Connector for SimConnector {
    type Channel = SimChannel;

    fn open(&self, _target: &str) -> Result<SimChannel, CallFailure> {
        Ok(SimChannel(Rc::clone(&self.0)))
    }
}

fn sim(capacity: usize, counter: u64) -> (SimConnector, Rc<RefCell<Dish>>) {
    let dish = Rc::new(RefCell::new(Dish {
        capacity,
        counter,
        boot_at: 0,
        fail_next: false,
    }));
    (SimConnector(Rc::clone(&dish)), dish)
}

fn config(loop_interval: f64, poll_loops: Option<u32>) -> PollConfig {
    PollConfig {
        loop_interval,
        poll_loops,
        modes: ModeSet::from(vec![Mode::PingDrop, Mode::PingRunLength, Mode::Usage]),
        ..PollConfig::default()
    }
}

fn expect_ready(outcome: CycleOutcome) -> StatsReport {
    match outcome {
        CycleOutcome::Ready(report) => report,
        other => panic!("expected a completed cycle, got {other:?}"),
    }
}

#[test]
fn consecutive_cycles_cover_every_sample_once() {
    let (connector, dish) = sim(50, 1000);
    let mut poller = Poller::new(DishGateway::with_default_target(connector), config(30.0, None));

    let mut total_samples = 0;
    let mut total_full_drops = 0;
    for _ in 0..10 {
        dish.borrow_mut().advance(30);
        let report = expect_ready(poller.poll_stats(false).unwrap());
        total_samples += report.result.general.samples;
        total_full_drops += report.result.ping_drop.count_full_ping_drop;
    }
    // First window is one interval (30 s); afterwards the counter chain
    // covers 1030..1300 exactly.
    assert_eq!(total_samples, 300);
    let expected: u64 = (1000..1300).filter(|&c| drop_at(c) >= 1.0).count() as u64;
    assert_eq!(total_full_drops, expected);
    assert_eq!(poller.state().counter_stats, Some(1300));
}

#[test]
fn aggregated_cycle_equals_one_long_window() {
    let (connector, dish) = sim(40, 500);
    let mut poller = Poller::new(
        DishGateway::with_default_target(connector),
        config(20.0, Some(3)),
    );
    poller.resume_from(Some(500));

    let mut report = None;
    for _ in 0..3 {
        dish.borrow_mut().advance(20);
        if let CycleOutcome::Ready(r) = poller.poll_stats(false).unwrap() {
            report = Some(r);
        }
    }
    let report = report.expect("third poll completes the cycle");
    assert_eq!(report.result.general.samples, 60);
    assert_eq!(report.result.general.end_counter, Some(560));

    // Same samples computed directly from a ring large enough to hold them.
    let big = Dish {
        capacity: 100,
        counter: 560,
        boot_at: 0,
        fail_next: false,
    };
    let direct = history_stats(&big.snapshot(), SampleLimit::All, Some(500));
    assert_eq!(report.result.ping_drop, direct.ping_drop);
    assert_eq!(report.result.run_length, direct.run_length);
    assert_eq!(report.result.usage, direct.usage);
    assert_eq!(report.result.latency, direct.latency);
}

#[test]
fn reboot_between_polls_is_absorbed() {
    let (connector, dish) = sim(40, 300);
    let mut poller = Poller::new(
        DishGateway::with_default_target(connector),
        config(10.0, Some(2)),
    );
    poller.resume_from(Some(290));

    assert_eq!(poller.poll_stats(false).unwrap(), CycleOutcome::Accumulating);
    {
        let mut d = dish.borrow_mut();
        d.reboot();
        d.advance(15);
    }
    let report = expect_ready(poller.poll_stats(false).unwrap());
    assert_eq!(
        report.discontinuities,
        vec![Discontinuity::Reboot {
            previous_counter: 300,
            new_counter: 15
        }]
    );
    assert_eq!(report.result.general.samples, 10 + 15);
    assert_eq!(poller.state().counter_stats, Some(15));

    // Next cycle picks up from the new boot's counter.
    dish.borrow_mut().advance(10);
    assert_eq!(poller.poll_stats(false).unwrap(), CycleOutcome::Accumulating);
    dish.borrow_mut().advance(10);
    let next = expect_ready(poller.poll_stats(false).unwrap());
    assert_eq!(next.result.general.samples, 20);
    assert!(next.discontinuities.is_empty());
}

#[test]
fn stale_connection_is_reopened_transparently() {
    let (connector, dish) = sim(20, 100);
    let mut poller = Poller::new(DishGateway::with_default_target(connector), config(0.0, None));
    expect_ready(poller.poll_stats(false).unwrap());

    dish.borrow_mut().advance(5);
    dish.borrow_mut().fail_next = true;
    let report = expect_ready(poller.poll_stats(false).unwrap());
    assert_eq!(report.result.general.samples, 5);
}

#[test]
fn gap_longer_than_the_ring_is_flagged() {
    let (connector, dish) = sim(30, 100);
    let mut poller = Poller::new(
        DishGateway::with_default_target(connector),
        config(10.0, Some(2)),
    );
    poller.resume_from(Some(95));
    assert_eq!(poller.poll_stats(false).unwrap(), CycleOutcome::Accumulating);
    dish.borrow_mut().advance(100);
    let report = expect_ready(poller.poll_stats(false).unwrap());
    assert_eq!(
        report.discontinuities,
        vec![Discontinuity::Gap { lost_samples: 70 }]
    );
    assert_eq!(report.result.general.samples, 5 + 30);
}

#[test]
fn replayed_capture_feeds_field_tables() {
    let capture = r#"[
        {"kind": "history", "current": 8,
         "pop_ping_drop_rate": [1.0, 1.0, 0.0, 1.0, 1.0, 1.0, 0.0, 0.0],
         "pop_ping_latency_ms": [0, 0, 30, 0, 0, 0, 32, 34]}
    ]"#;
    let connector = ReplayConnector::from_json(capture).unwrap();
    let mut poller = Poller::new(DishGateway::with_default_target(connector), config(0.0, None));
    let report = expect_ready(poller.poll_stats(false).unwrap());

    let run = &report.result.run_length;
    assert_eq!(run.init_run_fragment, 2);
    assert_eq!(run.run_seconds[2], 3);

    let names = column_names(&RunLengthStats::schema());
    let values = run.values();
    let col = names.iter().position(|n| n == "run_seconds_3").unwrap();
    assert_eq!(values[col].render(false), "3");
    assert_eq!(report.result.latency.mean_full_ping_latency, Some(32.0));

    // Capture exhausted: the next cycle has no history at all.
    assert!(poller.poll_stats(false).is_err());
}
