//! End-to-end aggregation over a frozen in-memory event source.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, Utc};

use audit_cuos::aggregate::{Orchestrator, SubjectOutcome, reporting_interval};
use audit_cuos::model::{
    ActionEvent, MembershipState, MonthKey, Role, RoleChangeEvent, RoleChangeKind,
};
use audit_cuos::source::{ActionQuery, Continuation, EventSource, Page, SourceError};

fn ts(s: &str) -> DateTime<Utc> {
    s.parse().unwrap()
}

/// "Now" fixed in September 2021: the interval covers March..August 2021.
fn now() -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(2021, 9, 10)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
        .and_utc()
}

/// Frozen event source: holders, a rights log served across several pages
/// (newest-first, like the real API), and per-subject action timestamps.
#[derive(Default)]
struct MockSource {
    holders: HashMap<Role, Vec<String>>,
    rights_pages: Vec<Vec<RoleChangeEvent>>,
    actions: HashMap<(Role, String), Vec<DateTime<Utc>>>,
    failing_subjects: HashSet<String>,
    rights_requests: Mutex<Vec<Option<String>>>,
}

impl MockSource {
    fn with_holders(mut self, role: Role, holders: &[&str]) -> Self {
        self.holders
            .insert(role, holders.iter().map(|s| s.to_string()).collect());
        self
    }

    fn with_rights_page(mut self, events: Vec<RoleChangeEvent>) -> Self {
        self.rights_pages.push(events);
        self
    }

    fn with_actions(mut self, role: Role, subject: &str, stamps: &[&str]) -> Self {
        self.actions
            .insert((role, subject.to_string()), stamps.iter().map(|s| ts(s)).collect());
        self
    }

    fn with_failing_subject(mut self, subject: &str) -> Self {
        self.failing_subjects.insert(subject.to_string());
        self
    }
}

impl EventSource for MockSource {
    fn current_holders(&self, role: Role) -> Result<Vec<String>, SourceError> {
        Ok(self.holders.get(&role).cloned().unwrap_or_default())
    }

    fn role_change_page(
        &self,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
        continuation: Option<&Continuation>,
    ) -> Result<Page<RoleChangeEvent>, SourceError> {
        self.rights_requests
            .lock()
            .unwrap()
            .push(continuation.map(|c| c.0.clone()));
        let index = match continuation {
            None => 0,
            Some(Continuation(token)) => token
                .parse::<usize>()
                .map_err(|_| SourceError::Malformed(format!("bad token {token}")))?,
        };
        let items = self.rights_pages.get(index).cloned().unwrap_or_default();
        let continuation = (index + 1 < self.rights_pages.len())
            .then(|| Continuation((index + 1).to_string()));
        Ok(Page {
            items,
            continuation,
        })
    }

    fn action_page(
        &self,
        query: &ActionQuery,
        _continuation: Option<&Continuation>,
    ) -> Result<Page<ActionEvent>, SourceError> {
        if self.failing_subjects.contains(&query.subject) {
            return Err(SourceError::Api {
                code: "ratelimited".into(),
                info: "too many requests".into(),
            });
        }
        let stamps = self
            .actions
            .get(&(query.role, query.subject.clone()))
            .cloned()
            .unwrap_or_default();
        let items = stamps
            .into_iter()
            .filter(|t| *t >= query.from && *t <= query.to)
            .map(|timestamp| ActionEvent { timestamp })
            .collect();
        Ok(Page::terminal(items))
    }
}

fn change(subject: &str, role: Role, stamp: &str, kind: RoleChangeKind) -> RoleChangeEvent {
    RoleChangeEvent {
        subject: subject.to_string(),
        role,
        timestamp: ts(stamp),
        kind,
    }
}

fn month(y: i32, m: u32) -> MonthKey {
    MonthKey::new(y, m).unwrap()
}

#[test]
fn unions_current_holders_with_rights_log_subjects() {
    // Carol no longer holds checkuser but lost it mid-interval; she must
    // still appear in the report.
    let source = MockSource::default()
        .with_holders(Role::CheckUser, &["Alice", "Bob"])
        .with_holders(Role::Oversight, &[])
        .with_rights_page(vec![change(
            "Carol",
            Role::CheckUser,
            "2021-05-02T09:00:00Z",
            RoleChangeKind::Remove,
        )])
        .with_actions(Role::CheckUser, "Carol", &["2021-04-11T00:00:00Z"]);

    let audit = Orchestrator::new(&source, reporting_interval(now()))
        .run(|_, _, _| {})
        .unwrap();

    let cu = &audit.roles[0];
    assert_eq!(cu.role, Role::CheckUser);
    let names: Vec<&String> = cu.subjects.keys().collect();
    assert_eq!(names, vec!["Alice", "Bob", "Carol"]);

    let carol = cu.subjects["Carol"].record().unwrap();
    assert_eq!(carol.actions.get(month(2021, 4)), 1);
    match &carol.membership {
        MembershipState::Windows(windows) => {
            assert_eq!(windows.len(), 1);
            assert_eq!(windows[0].end, ts("2021-05-02T09:00:00Z"));
        }
        other => panic!("expected explicit windows, got {other:?}"),
    }
}

#[test]
fn rights_log_pages_are_drained_and_normalized() {
    // Two pages, newest-first across pages; reconstruction needs them
    // oldest-first, which the orchestrator takes care of.
    let source = MockSource::default()
        .with_holders(Role::CheckUser, &["Dave"])
        .with_holders(Role::Oversight, &[])
        .with_rights_page(vec![change(
            "Dave",
            Role::CheckUser,
            "2021-06-15T00:00:00Z",
            RoleChangeKind::Remove,
        )])
        .with_rights_page(vec![change(
            "Dave",
            Role::CheckUser,
            "2021-03-10T00:00:00Z",
            RoleChangeKind::Add,
        )]);

    let audit = Orchestrator::new(&source, reporting_interval(now()))
        .run(|_, _, _| {})
        .unwrap();

    let requests = source.rights_requests.lock().unwrap().clone();
    assert_eq!(requests, vec![None, Some("1".to_string())]);

    let dave = audit.roles[0].subjects["Dave"].record().unwrap();
    match &dave.membership {
        MembershipState::Windows(windows) => {
            assert_eq!(windows.len(), 1);
            assert_eq!(windows[0].start, ts("2021-03-10T00:00:00Z"));
            assert_eq!(windows[0].end, ts("2021-06-15T00:00:00Z"));
        }
        other => panic!("expected one closed window, got {other:?}"),
    }
}

#[test]
fn unchanged_holder_is_continuously_active() {
    let source = MockSource::default()
        .with_holders(Role::CheckUser, &["Alice"])
        .with_holders(Role::Oversight, &["Alice"])
        .with_actions(
            Role::CheckUser,
            "Alice",
            &["2021-03-05T00:00:00Z", "2021-08-30T00:00:00Z"],
        );

    let audit = Orchestrator::new(&source, reporting_interval(now()))
        .run(|_, _, _| {})
        .unwrap();

    let cu_alice = audit.roles[0].subjects["Alice"].record().unwrap();
    assert_eq!(cu_alice.membership, MembershipState::Continuous);
    assert_eq!(cu_alice.actions.get(month(2021, 3)), 1);
    assert_eq!(cu_alice.actions.get(month(2021, 8)), 1);
    assert_eq!(cu_alice.actions.total(), 2);

    // The oversight record is independent; no suppressions were logged.
    let os_alice = audit.roles[1].subjects["Alice"].record().unwrap();
    assert_eq!(os_alice.actions.total(), 0);
}

#[test]
fn one_failing_subject_does_not_abort_the_batch() {
    let source = MockSource::default()
        .with_holders(Role::CheckUser, &["Alice", "Bob"])
        .with_holders(Role::Oversight, &[])
        .with_actions(Role::CheckUser, "Alice", &["2021-07-07T00:00:00Z"])
        .with_failing_subject("Bob");

    let audit = Orchestrator::new(&source, reporting_interval(now()))
        .run(|_, _, _| {})
        .unwrap();

    let cu = &audit.roles[0];
    assert!(cu.subjects["Alice"].record().is_some());
    assert!(matches!(cu.subjects["Bob"], SubjectOutcome::Failed(_)));
}

#[test]
fn inconsistent_rights_log_keeps_counts_but_drops_windows() {
    // Two consecutive Add events for Eve: the tenure windows cannot be
    // trusted, the counts still can.
    let source = MockSource::default()
        .with_holders(Role::CheckUser, &["Eve"])
        .with_holders(Role::Oversight, &[])
        .with_rights_page(vec![
            change("Eve", Role::CheckUser, "2021-06-01T00:00:00Z", RoleChangeKind::Add),
            change("Eve", Role::CheckUser, "2021-03-15T00:00:00Z", RoleChangeKind::Add),
        ])
        .with_actions(Role::CheckUser, "Eve", &["2021-04-04T00:00:00Z"]);

    let audit = Orchestrator::new(&source, reporting_interval(now()))
        .run(|_, _, _| {})
        .unwrap();

    let eve = audit.roles[0].subjects["Eve"].record().unwrap();
    assert_eq!(eve.membership, MembershipState::Unknown);
    assert_eq!(eve.actions.get(month(2021, 4)), 1);
}

#[test]
fn repeated_runs_over_a_frozen_source_are_identical() {
    let source = MockSource::default()
        .with_holders(Role::CheckUser, &["Alice", "Bob"])
        .with_holders(Role::Oversight, &["Carol"])
        .with_rights_page(vec![change(
            "Bob",
            Role::CheckUser,
            "2021-04-20T00:00:00Z",
            RoleChangeKind::Add,
        )])
        .with_actions(Role::CheckUser, "Alice", &["2021-03-01T00:00:00Z"])
        .with_actions(Role::CheckUser, "Bob", &["2021-05-09T00:00:00Z"])
        .with_actions(Role::Oversight, "Carol", &["2021-08-31T23:59:59Z"]);

    let interval = reporting_interval(now());
    let first = Orchestrator::new(&source, interval.clone())
        .run(|_, _, _| {})
        .unwrap();
    let second = Orchestrator::new(&source, interval)
        .run(|_, _, _| {})
        .unwrap();

    assert_eq!(format!("{first:?}"), format!("{second:?}"));
}

#[test]
fn progress_callback_covers_every_subject_once() {
    let source = MockSource::default()
        .with_holders(Role::CheckUser, &["Alice", "Bob"])
        .with_holders(Role::Oversight, &["Carol"]);

    let seen = Mutex::new(Vec::new());
    Orchestrator::new(&source, reporting_interval(now()))
        .run(|done, total, subject| {
            seen.lock().unwrap().push((done, total, subject.to_string()));
        })
        .unwrap();

    let mut seen = seen.into_inner().unwrap();
    assert_eq!(seen.len(), 3);
    assert!(seen.iter().all(|(_, total, _)| *total == 3));
    seen.sort();
    let done_values: Vec<usize> = seen.iter().map(|(done, _, _)| *done).collect();
    assert_eq!(done_values, vec![1, 2, 3]);
}
