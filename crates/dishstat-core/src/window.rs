//! Ring window resolution: which buffer slots hold new, valid samples.
//!
//! Given a snapshot, a requested sample count and an optional resume counter,
//! [`resolve_window`] returns the buffer indices to read in chronological
//! order. The indices form at most two contiguous segments (the second one
//! only when the window wraps past the end of the ring), and are never copied
//! out of the snapshot.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::history::HistorySnapshot;

/// Requested number of samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleLimit {
    /// Every valid sample in the snapshot.
    #[default]
    All,
    /// At most this many of the most recent samples.
    Count(u64),
}

impl SampleLimit {
    fn clamp(self, valid: u64) -> u64 {
        match self {
            Self::All => valid,
            Self::Count(n) => n.min(valid),
        }
    }
}

/// Two-segment index sequence over a ring buffer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WindowIndices {
    head: Range<usize>,
    tail: Range<usize>,
}

impl WindowIndices {
    pub fn empty() -> Self {
        Self::default()
    }

    fn contiguous(range: Range<usize>) -> Self {
        Self {
            head: range,
            tail: 0..0,
        }
    }

    fn wrapped(head: Range<usize>, tail: Range<usize>) -> Self {
        Self { head, tail }
    }

    /// The (first, second) segments still to be yielded.
    pub fn segments(&self) -> (Range<usize>, Range<usize>) {
        (self.head.clone(), self.tail.clone())
    }
}

impl Iterator for WindowIndices {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        self.head.next().or_else(|| self.tail.next())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.head.len() + self.tail.len();
        (n, Some(n))
    }
}

impl ExactSizeIterator for WindowIndices {}

/// Result of resolving a window against one snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleWindow {
    pub indices: WindowIndices,
    /// Number of samples in the window (`current - start`).
    pub samples: u64,
    /// Counter at resolution time; `None` if the snapshot was unavailable.
    pub current: Option<u64>,
    /// The resume counter was ahead of the device counter and was dropped.
    pub counter_reset: bool,
}

impl SampleWindow {
    /// Window for a snapshot that could not be obtained.
    pub fn unavailable() -> Self {
        Self {
            indices: WindowIndices::empty(),
            samples: 0,
            current: None,
            counter_reset: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.samples == 0
    }
}

/// Resolve which samples of `history` to read.
///
/// `start` is the counter of the last sample already processed. It is ignored
/// when it lies ahead of the device counter (the device rebooted), and moved
/// forward when it would make the window larger than `limit`.
pub fn resolve_window(
    history: Option<&HistorySnapshot>,
    limit: SampleLimit,
    start: Option<u64>,
) -> SampleWindow {
    let Some(history) = history else {
        return SampleWindow::unavailable();
    };

    let current = history.current;
    let stored = history.stored_len() as u64;
    let valid = if history.is_linear() {
        stored
    } else {
        stored.min(current)
    };
    let wanted = limit.clamp(valid);

    let counter_reset = matches!(start, Some(s) if s > current);
    if counter_reset {
        log::info!("counter reset detected ({start:?} > {current}), ignoring requested start");
    }
    let start = if counter_reset { None } else { start };

    // Signed: a stitched sequence may hold more samples than its counter
    // after a reboot was absorbed.
    let floor = i128::from(current) - i128::from(wanted);
    let start = match start {
        Some(s) if i128::from(s) >= floor => i128::from(s),
        _ => floor,
    };
    let samples = (i128::from(current) - start) as u64;

    log::debug!(
        "window: current={current} stored={stored} valid={valid} wanted={wanted} samples={samples}"
    );

    if samples == 0 {
        return SampleWindow {
            indices: WindowIndices::empty(),
            samples: 0,
            current: Some(current),
            counter_reset,
        };
    }

    let len = history.stored_len();
    let indices = if history.is_linear() {
        WindowIndices::contiguous(len - samples as usize..len)
    } else {
        let capacity = stored;
        let end_offset = (current % capacity) as usize;
        let start_offset = (start as u64 % capacity) as usize;
        if start_offset < end_offset {
            WindowIndices::contiguous(start_offset..end_offset)
        } else {
            WindowIndices::wrapped(start_offset..len, 0..end_offset)
        }
    };

    SampleWindow {
        indices,
        samples,
        current: Some(current),
        counter_reset,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::BufferLayout;

    fn ring(capacity: usize, current: u64) -> HistorySnapshot {
        HistorySnapshot::ring(current, vec![0.0; capacity])
    }

    #[test]
    fn wraparound_window_spans_two_segments() {
        let h = ring(10, 25);
        let w = resolve_window(Some(&h), SampleLimit::All, Some(18));
        assert_eq!(w.samples, 7);
        assert_eq!(w.current, Some(25));
        assert_eq!(w.indices.segments(), (8..10, 0..5));
        let idx: Vec<usize> = w.indices.collect();
        assert_eq!(idx, vec![8, 9, 0, 1, 2, 3, 4]);
    }

    #[test]
    fn contiguous_window_when_offsets_ordered() {
        let h = ring(10, 27);
        let w = resolve_window(Some(&h), SampleLimit::All, Some(22));
        assert_eq!(w.indices.collect::<Vec<_>>(), vec![2, 3, 4, 5, 6]);
    }

    #[test]
    fn start_equal_current_gives_empty_window_with_counter() {
        let h = ring(10, 25);
        let w = resolve_window(Some(&h), SampleLimit::All, Some(25));
        assert!(w.is_empty());
        assert_eq!(w.indices.len(), 0);
        assert_eq!(w.current, Some(25));
        assert!(!w.counter_reset);
    }

    #[test]
    fn start_ahead_of_current_behaves_like_no_start() {
        let h = ring(10, 25);
        let reset = resolve_window(Some(&h), SampleLimit::Count(4), Some(90));
        let fresh = resolve_window(Some(&h), SampleLimit::Count(4), None);
        assert!(reset.counter_reset);
        assert_eq!(reset.samples, fresh.samples);
        assert_eq!(reset.indices, fresh.indices);
        assert_eq!(reset.current, fresh.current);
    }

    #[test]
    fn old_start_is_trimmed_to_limit() {
        let h = ring(10, 25);
        let w = resolve_window(Some(&h), SampleLimit::Count(3), Some(2));
        assert_eq!(w.samples, 3);
        assert_eq!(w.indices.collect::<Vec<_>>(), vec![2, 3, 4]);
    }

    #[test]
    fn young_ring_is_limited_by_counter() {
        // Only 4 samples were ever written into a 10-slot ring.
        let h = ring(10, 4);
        let w = resolve_window(Some(&h), SampleLimit::All, None);
        assert_eq!(w.samples, 4);
        assert_eq!(w.indices.collect::<Vec<_>>(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn full_ring_at_capacity_multiple() {
        let h = ring(10, 20);
        let w = resolve_window(Some(&h), SampleLimit::All, None);
        assert_eq!(w.samples, 10);
        assert_eq!(w.indices.collect::<Vec<_>>(), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn unavailable_snapshot_reports_no_counter() {
        let w = resolve_window(None, SampleLimit::All, Some(3));
        assert!(w.is_empty());
        assert_eq!(w.current, None);
    }

    #[test]
    fn empty_ring_yields_nothing() {
        let h = ring(0, 50);
        let w = resolve_window(Some(&h), SampleLimit::All, None);
        assert!(w.is_empty());
        assert_eq!(w.current, Some(50));
    }

    #[test]
    fn linear_sequence_is_read_from_the_end() {
        let mut h = HistorySnapshot::ring(40, vec![0.0; 90]);
        h.layout = BufferLayout::Linear;
        // More stored samples than the counter: a reboot was stitched in.
        let all = resolve_window(Some(&h), SampleLimit::All, None);
        assert_eq!(all.samples, 90);
        assert_eq!(all.indices.segments(), (0..90, 0..0));

        let tail = resolve_window(Some(&h), SampleLimit::All, Some(35));
        assert_eq!(tail.samples, 5);
        assert_eq!(tail.indices.collect::<Vec<_>>(), vec![85, 86, 87, 88, 89]);
    }

    #[test]
    fn never_exceeds_limit_or_valid_count() {
        for capacity in [1usize, 3, 7, 10] {
            for current in 0u64..40 {
                let h = ring(capacity, current);
                for n in 0u64..15 {
                    let starts = [
                        None,
                        Some(0),
                        Some(current / 2),
                        Some(current),
                        Some(current + 3),
                    ];
                    for start in starts {
                        let w = resolve_window(Some(&h), SampleLimit::Count(n), start);
                        let bound = n.min((capacity as u64).min(current));
                        assert!(w.samples <= bound, "cap={capacity} cur={current} n={n}");
                        assert_eq!(w.indices.len() as u64, w.samples);
                        assert!(w.indices.clone().all(|i| i < capacity));
                    }
                }
            }
        }
    }
}
