//! Time Window Calculator: the canonical six-full-month reporting interval.

use chrono::{DateTime, Utc};

use crate::model::{MonthKey, ReportingInterval};

/// Derive the reporting interval from "now". The in-progress month is never
/// included: the window ends at 23:59:59 on the last day of the previous
/// calendar month and opens at 00:00:00 on day 1 five months before that
/// month, six full months inclusive. Pure function of `now`.
pub fn reporting_interval(now: DateTime<Utc>) -> ReportingInterval {
    let current = MonthKey::from_date(now.date_naive());
    let last_month = current.minus_months(1);
    let first_month = last_month.minus_months(5);

    let mut months = [first_month; 6];
    for i in 1..6 {
        months[i] = months[i - 1].next();
    }

    ReportingInterval {
        window_start: first_month.first_instant(),
        window_end: last_month.last_instant(),
        months,
    }
}
