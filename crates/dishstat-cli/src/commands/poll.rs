use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use dishstat_core::{
    BulkReport, CycleOutcome, Mode, PollConfig, Poller, ReplayConnector, SampleLimit, unix_now,
};

use crate::output::{self, Line};

pub struct PollCommandConfig<'a> {
    pub modes: Vec<Mode>,
    pub target: Option<&'a str>,
    pub replay: Option<&'a Path>,
    pub config_path: Option<&'a Path>,
    pub loop_interval: Option<f64>,
    pub poll_loops: Option<u32>,
    pub samples: Option<u64>,
    pub all_samples: bool,
    pub no_counter: bool,
    pub numeric: bool,
    pub verbose: bool,
    pub out_file: Option<PathBuf>,
    pub skip_query: bool,
}

/// Merge the optional configuration file with command-line flags; flags win.
fn build_config(cmd: &PollCommandConfig) -> dishstat_core::Result<PollConfig> {
    let mut config = match cmd.config_path {
        Some(path) => PollConfig::load(path)?,
        None => PollConfig::default(),
    };
    if let Some(target) = cmd.target {
        config.target = target.to_string();
    }
    if !cmd.modes.is_empty() {
        config.modes = cmd.modes.iter().copied().collect();
    }
    if let Some(interval) = cmd.loop_interval {
        config.loop_interval = interval;
    }
    if cmd.poll_loops.is_some() {
        config.poll_loops = cmd.poll_loops;
    }
    if cmd.all_samples {
        config.samples = Some(SampleLimit::All);
    } else if let Some(n) = cmd.samples {
        config.samples = Some(SampleLimit::Count(n));
    }
    config.track_counter &= !cmd.no_counter;
    config.numeric |= cmd.numeric;
    config.verbose |= cmd.verbose;
    config.validate()?;
    Ok(config)
}

/// Whether to look up the resume counter in the existing output file.
fn should_query_prior(cmd: &PollCommandConfig, config: &PollConfig) -> bool {
    cmd.out_file.is_some()
        && config.modes.history_stats_mode()
        && !(cmd.skip_query || !config.track_counter || config.verbose || config.samples.is_some())
}

pub fn run(cmd: PollCommandConfig) {
    let config = match build_config(&cmd) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let gateway = super::make_gateway(Some(&config.target), cmd.replay);
    let mut poller = Poller::new(gateway, config.clone());
    if should_query_prior(&cmd, &config)
        && let Some(path) = cmd.out_file.as_deref()
    {
        let counter = output::prior_counter(path);
        if let Some(c) = counter {
            log::info!("resuming statistics after sample counter {c}");
        }
        poller.resume_from(counter);
    }

    let out = match output::open_output(cmd.out_file.as_deref()) {
        Ok(out) => out,
        Err(e) => {
            eprintln!("Error opening output file: {e}");
            std::process::exit(1);
        }
    };
    let mut session = PollSession {
        poller,
        out,
        to_file: cmd.out_file.is_some(),
    };

    // Ctrl+C and SIGTERM both end the loop with a final flush.
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl+C handler");

    let mut rc;
    let mut next_loop = Instant::now();
    loop {
        rc = session.iterate(false);
        let Some(interval) = config.interval() else {
            break;
        };
        let now = Instant::now();
        next_loop = (next_loop + interval).max(now);
        while Instant::now() < next_loop && running.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(10));
        }
        if !running.load(Ordering::SeqCst) {
            break;
        }
    }

    session.iterate(true);
    session.poller.shutdown();
    if rc != 0 {
        std::process::exit(rc);
    }
}

/// CSV row time: the status fetch, else the statistics fetch, else now.
fn row_timestamp(status_ts: Option<i64>, stats_ts: Option<i64>) -> i64 {
    status_ts
        .or(stats_ts)
        .unwrap_or_else(|| unix_now() as i64)
}

/// One polling run: the poller plus where its output goes.
struct PollSession<W: Write> {
    poller: Poller<ReplayConnector>,
    out: W,
    to_file: bool,
}

impl<W: Write> PollSession<W> {
    /// Report a dish communication failure; on stdout while looping into a file.
    fn conn_error(&self, message: &str) {
        if self.poller.config().is_looping() && self.to_file {
            println!("{message}");
        } else {
            log::error!("{message}");
        }
    }

    /// Run one loop iteration and write its output. With `shutdown`, only
    /// pending statistics are flushed. Returns the process exit code.
    fn iterate(&mut self, shutdown: bool) -> i32 {
        let config = self.poller.config().clone();
        let modes = &config.modes;
        if shutdown && config.poll_loops() < 2 {
            return 0;
        }

        let mut rc = 0;
        let mut line = Line::default();
        let mut status_ts = None;
        let mut stats_ts = None;

        if !shutdown && modes.status_mode() {
            match self.poller.poll_status() {
                Ok(report) => {
                    status_ts = Some(report.timestamp);
                    if let Some(status) = &report.status {
                        line.push(status);
                    }
                    if let Some(detail) = &report.obstruction_detail {
                        line.push(detail);
                    }
                    if let Some(alerts) = &report.alert_detail {
                        line.push(alerts);
                    }
                    if let Some(location) = &report.location {
                        line.push(location);
                    }
                }
                Err(e) => {
                    self.conn_error(&format!("Failure getting status: {e}"));
                    rc = 1;
                }
            }
        }

        if modes.history_stats_mode() && (rc == 0 || config.poll_loops() > 1) {
            match self.poller.poll_stats(shutdown) {
                Ok(CycleOutcome::Ready(report)) => {
                    stats_ts = Some(report.timestamp);
                    line.push_stats(&report.result, modes);
                }
                Ok(CycleOutcome::Accumulating | CycleOutcome::Idle) => {}
                Err(e) => {
                    self.conn_error(&format!("Failure getting history: {e}"));
                    if rc == 0 {
                        rc = 1;
                    }
                }
            }
        }

        if !shutdown && modes.bulk_mode() && rc == 0 {
            match self.poller.poll_bulk() {
                Ok(report) => {
                    if let Err(e) = self.write_bulk(&report, &config) {
                        log::error!("Failed writing output: {e}");
                        rc = 1;
                    }
                }
                Err(e) => {
                    self.conn_error(&format!("Failure getting history: {e}"));
                    rc = 1;
                }
            }
        }

        if !line.is_empty() {
            let text = if config.verbose {
                line.to_verbose(config.numeric)
            } else {
                let timestamp = row_timestamp(status_ts, stats_ts);
                line.to_csv(timestamp, config.numeric)
            };
            let written = writeln!(self.out, "{text}").and_then(|()| {
                if config.verbose && config.is_looping() {
                    writeln!(self.out)?;
                }
                self.out.flush()
            });
            if let Err(e) = written {
                log::error!("Failed writing output: {e}");
                rc = 1;
            }
        }
        rc
    }

    fn write_bulk(&mut self, report: &BulkReport, config: &PollConfig) -> std::io::Result<()> {
        if config.verbose {
            writeln!(self.out, "{}", output::bulk_verbose(report, config.numeric))?;
            if config.is_looping() {
                writeln!(self.out)?;
            }
        } else {
            for row in output::bulk_csv(report, config.numeric) {
                writeln!(self.out, "{row}")?;
            }
        }
        self.out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dishstat_core::{DishGateway, ModeSet};

    fn command(modes: &[Mode]) -> PollCommandConfig<'static> {
        PollCommandConfig {
            modes: modes.to_vec(),
            target: None,
            replay: None,
            config_path: None,
            loop_interval: None,
            poll_loops: None,
            samples: None,
            all_samples: false,
            no_counter: false,
            numeric: false,
            verbose: false,
            out_file: None,
            skip_query: false,
        }
    }

    const CAPTURE: &str = r#"[
        {"kind": "status", "device_info": {"id": "ut01"}, "alerts": {"motors_stuck": true}},
        {"kind": "history", "current": 4, "pop_ping_drop_rate": [0.0, 1.0, 0.0, 0.5]},
        {"kind": "history", "current": 6, "pop_ping_drop_rate": [1.0, 1.0, 0.0, 0.5]}
    ]"#;

    fn session(config: PollConfig) -> PollSession<Vec<u8>> {
        let connector = ReplayConnector::from_json(CAPTURE).unwrap();
        PollSession {
            poller: Poller::new(DishGateway::with_default_target(connector), config)
                .with_clock(|| 1_700_000_000.0),
            out: Vec::new(),
            to_file: false,
        }
    }

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("poll.json");
        std::fs::write(
            &path,
            r#"{"target": "10.0.0.1:9200", "modes": ["usage"], "loop_interval": 60.0, "numeric": true}"#,
        )
        .unwrap();
        let mut cmd = command(&[Mode::PingDrop]);
        cmd.config_path = Some(&path);
        cmd.samples = Some(30);
        cmd.no_counter = true;
        let config = build_config(&cmd).unwrap();
        assert_eq!(config.target, "10.0.0.1:9200");
        assert_eq!(config.modes, ModeSet::from(vec![Mode::PingDrop]));
        assert_eq!(config.loop_interval, 60.0);
        assert_eq!(config.samples, Some(SampleLimit::Count(30)));
        assert!(config.numeric);
        assert!(!config.track_counter);
    }

    #[test]
    fn invalid_combination_is_rejected() {
        assert!(build_config(&command(&[])).is_err());
        assert!(build_config(&command(&[Mode::BulkHistory, Mode::Status])).is_err());
        let mut verbose = command(&[Mode::BulkHistory, Mode::Status]);
        verbose.verbose = true;
        assert!(build_config(&verbose).is_ok());
    }

    #[test]
    fn prior_counter_query_conditions() {
        fn config(cmd: &PollCommandConfig) -> PollConfig {
            build_config(cmd).unwrap()
        }
        let mut cmd = command(&[Mode::PingDrop]);
        assert!(!should_query_prior(&cmd, &config(&cmd)));

        cmd.out_file = Some(PathBuf::from("stats.csv"));
        assert!(should_query_prior(&cmd, &config(&cmd)));

        cmd.samples = Some(10);
        assert!(!should_query_prior(&cmd, &config(&cmd)));
        cmd.samples = None;
        cmd.skip_query = true;
        assert!(!should_query_prior(&cmd, &config(&cmd)));

        let mut status = command(&[Mode::Status]);
        status.out_file = Some(PathBuf::from("status.csv"));
        assert!(!should_query_prior(&status, &config(&status)));
    }

    #[test]
    fn row_time_prefers_status_then_stats_then_clock() {
        assert_eq!(row_timestamp(Some(10), Some(20)), 10);
        assert_eq!(row_timestamp(None, Some(20)), 20);
        let before = unix_now() as i64;
        let fallback = row_timestamp(None, None);
        assert!(fallback >= before);
        assert!(fallback > 1_600_000_000);
    }

    #[test]
    fn status_row_is_timestamped_csv() {
        let config = build_config(&command(&[Mode::Status])).unwrap();
        let mut s = session(config);
        assert_eq!(s.iterate(false), 0);
        let text = String::from_utf8(s.out).unwrap();
        assert!(text.starts_with("2023-11-14T22:13:20,ut01,"));
        assert_eq!(text.lines().count(), 1);
    }

    #[test]
    fn stats_rows_follow_each_fetch() {
        let config = build_config(&command(&[Mode::PingDrop])).unwrap();
        let mut s = session(config);
        assert_eq!(s.iterate(false), 0);
        assert_eq!(s.iterate(false), 0);
        // Capture exhausted.
        assert_eq!(s.iterate(false), 1);
        // Single-iteration cycles have nothing to flush.
        assert_eq!(s.iterate(true), 0);

        let text = String::from_utf8(s.out).unwrap();
        let rows: Vec<&str> = text.lines().collect();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].starts_with("2023-11-14T22:13:20,4,4,1.5,1,"));
        // Second read resumes at counter 4: samples 4 and 5.
        assert!(rows[1].starts_with("2023-11-14T22:13:20,2,6,2.0,2,"));
    }

    #[test]
    fn verbose_stats_are_labelled() {
        let mut cmd = command(&[Mode::Usage]);
        cmd.verbose = true;
        let mut s = session(build_config(&cmd).unwrap());
        assert_eq!(s.iterate(false), 0);
        let text = String::from_utf8(s.out).unwrap();
        assert!(text.contains("Parsed samples:        4"));
        assert!(text.contains("Bytes downloaded:"));
    }

    #[test]
    fn bulk_rows_are_written_per_sample() {
        let config = build_config(&command(&[Mode::BulkHistory])).unwrap();
        let mut s = session(config);
        assert_eq!(s.iterate(false), 0);
        let text = String::from_utf8(s.out).unwrap();
        assert_eq!(text.lines().count(), 4);
        assert!(text.starts_with("2023-11-14T22:13:17,0.0,"));
    }
}
