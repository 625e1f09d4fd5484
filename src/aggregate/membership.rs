//! Membership Interval Reconstructor: turn an alternating sequence of role
//! grants and removals into tenure windows bounded by the reporting
//! interval.

use chrono::Duration;

use crate::model::{ActiveWindow, ReportingInterval, RoleChangeEvent, RoleChangeKind};

use super::AggregateError;

/// Rebuild a subject's active tenure windows from its chronologically
/// ordered role-change events.
///
/// A `Remove` closes a window that started at the previous event, or one day
/// before `window_start` when it leads the sequence (the role was held from
/// before the interval). An `Add` opens a window that the next event closes,
/// or that runs to one day past `window_end` when it trails the sequence
/// (the role is still held). A leading `Remove` and a trailing `Add` are
/// expected boundary cases, not errors.
///
/// Walking a strictly alternating sequence in order yields windows that are
/// chronologically ordered and non-overlapping by construction. Consecutive
/// same-kind events, out-of-order timestamps, or a timestamp outside the
/// interval mean the rights log is corrupted; that is reported as a
/// [`AggregateError::DataConsistency`], never guessed around.
///
/// The caller must not pass an empty sequence: a subject with no change
/// events held the role throughout and is modeled as
/// [`crate::model::MembershipState::Continuous`] without calling this.
pub fn reconstruct_windows(
    events: &[RoleChangeEvent],
    interval: &ReportingInterval,
) -> Result<Vec<ActiveWindow>, AggregateError> {
    validate(events, interval)?;

    let last = events.len() - 1;
    let mut windows = Vec::new();
    for (idx, event) in events.iter().enumerate() {
        match event.kind {
            RoleChangeKind::Remove => {
                let start = if idx == 0 {
                    interval.window_start - Duration::days(1)
                } else {
                    events[idx - 1].timestamp
                };
                windows.push(ActiveWindow {
                    start,
                    end: event.timestamp,
                });
            }
            RoleChangeKind::Add => {
                if idx == last {
                    windows.push(ActiveWindow {
                        start: event.timestamp,
                        end: interval.window_end + Duration::days(1),
                    });
                }
                // An Add followed by a Remove is folded into the Remove arm.
            }
        }
    }
    Ok(windows)
}

fn validate(
    events: &[RoleChangeEvent],
    interval: &ReportingInterval,
) -> Result<(), AggregateError> {
    let inconsistent = |detail: String| AggregateError::DataConsistency {
        subject: events
            .first()
            .map(|e| e.subject.clone())
            .unwrap_or_default(),
        detail,
    };

    if events.is_empty() {
        return Err(inconsistent("empty event sequence".into()));
    }
    for event in events {
        if !interval.contains(event.timestamp) {
            return Err(inconsistent(format!(
                "event at {} falls outside the reporting interval",
                event.timestamp
            )));
        }
    }
    for pair in events.windows(2) {
        if pair[0].timestamp > pair[1].timestamp {
            return Err(inconsistent(format!(
                "events out of order at {}",
                pair[1].timestamp
            )));
        }
        if pair[0].kind == pair[1].kind {
            return Err(inconsistent(format!(
                "consecutive {:?} events at {} and {}",
                pair[0].kind, pair[0].timestamp, pair[1].timestamp
            )));
        }
    }
    Ok(())
}
