//! Typed entities shared across the fetch, aggregation, and report layers.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A calendar month, year-qualified so a reporting window spanning a year
/// boundary cannot collide two Julys.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct MonthKey {
    year: i32,
    /// 1-based calendar month.
    month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn from_instant(instant: DateTime<Utc>) -> Self {
        Self::from_date(instant.date_naive())
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// The month `n` calendar months before this one, rolling over year
    /// boundaries (January 2021 minus 6 is July 2020).
    pub fn minus_months(&self, n: u32) -> Self {
        let total = self.year * 12 + (self.month as i32 - 1) - n as i32;
        Self {
            year: total.div_euclid(12),
            month: total.rem_euclid(12) as u32 + 1,
        }
    }

    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// 00:00:00 UTC on the first day of the month.
    pub fn first_instant(&self) -> DateTime<Utc> {
        // Day 1 of a 1..=12 month is always a valid date.
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .expect("month key holds a valid month")
            .and_hms_opt(0, 0, 0)
            .expect("midnight is a valid time")
            .and_utc()
    }

    /// 23:59:59 UTC on the last day of the month.
    pub fn last_instant(&self) -> DateTime<Utc> {
        self.next().first_instant() - chrono::Duration::seconds(1)
    }

    /// Whether the given instant falls inside this calendar month.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        Self::from_instant(instant) == *self
    }
}

impl std::fmt::Display for MonthKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// The six-full-month reporting window, computed once per run and immutable
/// afterward. `window_end` is 23:59:59 on the last day of the previous
/// calendar month; `window_start` is 00:00:00 on day 1 five months before
/// that month. `months` lists the six covered month keys in chronological
/// order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportingInterval {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub months: [MonthKey; 6],
}

impl ReportingInterval {
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.window_start && instant <= self.window_end
    }

    pub fn first_month(&self) -> MonthKey {
        self.months[0]
    }

    pub fn last_month(&self) -> MonthKey {
        self.months[5]
    }
}

/// Tracked privileged roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    CheckUser,
    Oversight,
}

impl Role {
    pub const ALL: [Role; 2] = [Role::CheckUser, Role::Oversight];

    /// User-group name as it appears in `oldgroups`/`newgroups` and in
    /// `list=allusers` queries.
    pub fn group_name(&self) -> &'static str {
        match self {
            Role::CheckUser => "checkuser",
            Role::Oversight => "oversight",
        }
    }

    /// Short tag used in table ref markers (`+cu`, `-os`).
    pub fn tag(&self) -> &'static str {
        match self {
            Role::CheckUser => "cu",
            Role::Oversight => "os",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.group_name())
    }
}

/// Direction of a rights-log change for one tracked role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoleChangeKind {
    Add,
    Remove,
}

/// One grant or removal of a tracked role, derived from a rights-log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleChangeEvent {
    pub subject: String,
    pub role: Role,
    pub timestamp: DateTime<Utc>,
    pub kind: RoleChangeKind,
}

/// A single logged privileged action (a check or a suppression). Only the
/// timestamp matters for counting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionEvent {
    pub timestamp: DateTime<Utc>,
}

/// A contiguous period during which a subject held a role. `start` may fall
/// one day before the reporting window (held since before the interval) and
/// `end` one day after it (still held at the interval's close).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ActiveWindow {
    /// Whether any instant of the given calendar month falls inside this
    /// window.
    pub fn overlaps_month(&self, month: MonthKey) -> bool {
        self.start <= month.last_instant() && self.end >= month.first_instant()
    }
}

/// Per-month action counts with a fixed key set: exactly one entry per month
/// of the reporting interval, zero-initialized at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionCount {
    counts: BTreeMap<MonthKey, u64>,
}

impl ActionCount {
    pub fn zeroed(months: &[MonthKey; 6]) -> Self {
        Self {
            counts: months.iter().map(|m| (*m, 0)).collect(),
        }
    }

    /// Increment the entry for `month`. Returns `false` when the month is
    /// not one of the configured keys; the caller treats that as a contract
    /// violation.
    #[must_use]
    pub fn increment(&mut self, month: MonthKey) -> bool {
        match self.counts.get_mut(&month) {
            Some(slot) => {
                *slot += 1;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, month: MonthKey) -> u64 {
        self.counts.get(&month).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }
}

/// What is known about a subject's tenure across the interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MembershipState {
    /// No role changes were logged in the interval; the subject held the
    /// role throughout.
    Continuous,
    /// Tenure windows reconstructed from the rights log, chronologically
    /// ordered and non-overlapping.
    Windows(Vec<ActiveWindow>),
    /// The rights-log sequence for this subject was inconsistent; counts are
    /// still reported but the tenure windows are not trusted.
    Unknown,
}

impl MembershipState {
    /// Whether the subject was active at any point during `month`.
    /// `Continuous` and `Unknown` both report every month as active;
    /// `Unknown` is flagged separately by the renderer.
    pub fn active_in_month(&self, month: MonthKey) -> bool {
        match self {
            MembershipState::Continuous | MembershipState::Unknown => true,
            MembershipState::Windows(windows) => {
                windows.iter().any(|w| w.overlaps_month(month))
            }
        }
    }
}

/// Finished aggregation for one subject under one role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectRecord {
    pub subject: String,
    pub actions: ActionCount,
    pub membership: MembershipState,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32) -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
            .and_utc()
    }

    #[test]
    fn month_key_display_is_zero_padded() {
        let key = MonthKey::new(2021, 3).unwrap();
        assert_eq!(key.to_string(), "2021-03");
    }

    #[test]
    fn month_key_rejects_out_of_range_months() {
        assert!(MonthKey::new(2021, 0).is_none());
        assert!(MonthKey::new(2021, 13).is_none());
    }

    #[test]
    fn minus_months_rolls_over_year() {
        let jan = MonthKey::new(2021, 1).unwrap();
        assert_eq!(jan.minus_months(6), MonthKey::new(2020, 7).unwrap());
        assert_eq!(jan.minus_months(1), MonthKey::new(2020, 12).unwrap());
        assert_eq!(jan.minus_months(13), MonthKey::new(2019, 12).unwrap());
    }

    #[test]
    fn next_rolls_over_december() {
        let dec = MonthKey::new(2020, 12).unwrap();
        assert_eq!(dec.next(), MonthKey::new(2021, 1).unwrap());
    }

    #[test]
    fn month_instants_bracket_the_month() {
        let feb = MonthKey::new(2020, 2).unwrap();
        assert_eq!(feb.first_instant(), utc(2020, 2, 1, 0));
        // 2020 is a leap year; the month ends 2020-02-29 23:59:59.
        let expected_end = NaiveDate::from_ymd_opt(2020, 2, 29)
            .unwrap()
            .and_hms_opt(23, 59, 59)
            .unwrap()
            .and_utc();
        assert_eq!(feb.last_instant(), expected_end);
    }

    #[test]
    fn action_count_rejects_unknown_month() {
        let months = [
            MonthKey::new(2021, 3).unwrap(),
            MonthKey::new(2021, 4).unwrap(),
            MonthKey::new(2021, 5).unwrap(),
            MonthKey::new(2021, 6).unwrap(),
            MonthKey::new(2021, 7).unwrap(),
            MonthKey::new(2021, 8).unwrap(),
        ];
        let mut counts = ActionCount::zeroed(&months);
        assert!(counts.increment(MonthKey::new(2021, 3).unwrap()));
        assert!(!counts.increment(MonthKey::new(2021, 9).unwrap()));
        assert_eq!(counts.get(MonthKey::new(2021, 3).unwrap()), 1);
        assert_eq!(counts.total(), 1);
    }

    #[test]
    fn window_month_overlap() {
        let window = ActiveWindow {
            start: utc(2021, 3, 10, 0),
            end: utc(2021, 6, 15, 0),
        };
        assert!(window.overlaps_month(MonthKey::new(2021, 3).unwrap()));
        assert!(window.overlaps_month(MonthKey::new(2021, 6).unwrap()));
        assert!(!window.overlaps_month(MonthKey::new(2021, 2).unwrap()));
        assert!(!window.overlaps_month(MonthKey::new(2021, 7).unwrap()));
    }
}
