//! Monthly Action Counter: bucket timestamped events into fixed month keys.

use crate::model::{ActionCount, ActionEvent, MonthKey};

use super::AggregateError;

/// Count events per calendar month over the six configured keys. Entries are
/// zero-initialized, so quiet months appear explicitly. Counting is
/// commutative: input order never affects the result.
///
/// An event whose month is not one of the six keys means the fetch query was
/// scoped wrong; that is a [`AggregateError::ContractViolation`], not a
/// condition to recover from.
pub fn count_by_month(
    events: &[ActionEvent],
    months: &[MonthKey; 6],
) -> Result<ActionCount, AggregateError> {
    let mut counts = ActionCount::zeroed(months);
    for event in events {
        let month = MonthKey::from_instant(event.timestamp);
        if !counts.increment(month) {
            return Err(AggregateError::ContractViolation {
                detail: format!(
                    "event at {} falls in {month}, outside the configured interval",
                    event.timestamp
                ),
            });
        }
    }
    Ok(counts)
}
