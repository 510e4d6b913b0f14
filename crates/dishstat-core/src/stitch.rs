//! Stitching consecutive history replies into one chronological sequence.

use serde::Serialize;

use crate::history::{HistoryField, HistorySnapshot};
use crate::window::{SampleLimit, SampleWindow, resolve_window};

/// Informational break in the sample sequence detected while stitching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Discontinuity {
    /// The counter went backwards between polls.
    Reboot { previous_counter: u64, new_counter: u64 },
    /// More samples elapsed between polls than the ring retains.
    Gap { lost_samples: u64 },
}

/// Stitched sequence plus any break detected on the way.
#[derive(Debug, Clone, PartialEq)]
pub struct Stitched {
    pub history: HistorySnapshot,
    pub discontinuity: Option<Discontinuity>,
}

/// Number of samples in `new` that follow `previous`, and whether the
/// sequence is broken between them.
fn fresh_samples(
    previous: &HistorySnapshot,
    new: &HistorySnapshot,
) -> (u64, Option<Discontinuity>) {
    let capacity = new.stored_len() as u64;
    if new.current < previous.current {
        log::info!(
            "dish reboot detected (counter {} -> {}), appending anyway",
            previous.current,
            new.current
        );
        let reboot = Discontinuity::Reboot {
            previous_counter: previous.current,
            new_counter: new.current,
        };
        return (new.current.min(capacity), Some(reboot));
    }

    let delta = new.current - previous.current;
    if delta > capacity {
        log::warn!(
            "appending discontiguous samples, {} lost; polling interval probably too long",
            delta - capacity
        );
        return (
            capacity,
            Some(Discontinuity::Gap {
                lost_samples: delta - capacity,
            }),
        );
    }
    (delta, None)
}

fn append_window(
    out: &mut HistorySnapshot,
    src: &HistorySnapshot,
    window: SampleWindow,
    fields: &[HistoryField],
) {
    for i in window.indices {
        for &field in fields {
            if let (Some(dst), Some(value)) = (out.field_mut(field), src.value(field, i)) {
                dst.push(value);
            }
        }
    }
}

/// Merge `new` onto `previous`.
///
/// `limit` and `start` select the part of `previous` to keep; from `new`
/// only the samples written since `previous` was taken are appended. Fields
/// missing on either side are left out of the result. If `new` is `None` (the
/// fetch failed) `previous` is returned untouched.
pub fn stitch(
    previous: HistorySnapshot,
    new: Option<&HistorySnapshot>,
    limit: SampleLimit,
    start: Option<u64>,
) -> Stitched {
    let Some(new) = new else {
        return Stitched {
            history: previous,
            discontinuity: None,
        };
    };

    let (fresh, discontinuity) = fresh_samples(&previous, new);

    let fields: Vec<HistoryField> = HistoryField::ALL
        .into_iter()
        .filter(|&f| previous.field(f).is_some() && new.field(f).is_some())
        .collect();
    let mut out = HistorySnapshot::empty_linear(&fields);

    let window = resolve_window(Some(&previous), limit, start);
    append_window(&mut out, &previous, window, &fields);

    let window = resolve_window(Some(new), SampleLimit::Count(fresh), None);
    append_window(&mut out, new, window, &fields);

    out.current = new.current;
    Stitched {
        history: out,
        discontinuity,
    }
}
