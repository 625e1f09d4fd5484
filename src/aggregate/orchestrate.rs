//! Aggregation Orchestrator: compose fetch, count, and reconstruction into
//! per-subject records for every tracked role.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{debug, info, warn};

use crate::model::{
    ActionEvent, MembershipState, ReportingInterval, Role, RoleChangeEvent, SubjectRecord,
};
use crate::source::{ActionQuery, DEFAULT_PAGE_LIMIT, EventSource};

use super::{AggregateError, count_by_month, drain_pages, reconstruct_windows};

/// Result of aggregating one subject. Failures are recorded, not raised:
/// one subject's bad fetch never takes down the batch.
#[derive(Debug)]
pub enum SubjectOutcome {
    Complete(SubjectRecord),
    Failed(AggregateError),
}

impl SubjectOutcome {
    pub fn record(&self) -> Option<&SubjectRecord> {
        match self {
            SubjectOutcome::Complete(record) => Some(record),
            SubjectOutcome::Failed(_) => None,
        }
    }
}

/// Aggregated outcomes for one role, keyed by subject. Iteration order is
/// the map's; presentation ordering is the renderer's concern.
#[derive(Debug)]
pub struct RoleReport {
    pub role: Role,
    pub subjects: BTreeMap<String, SubjectOutcome>,
}

/// The finished audit: one report per tracked role over one interval.
#[derive(Debug)]
pub struct AuditReport {
    pub interval: ReportingInterval,
    pub roles: Vec<RoleReport>,
}

/// Drives the aggregation against an event source. Subjects are mutually
/// independent and processed on the rayon pool; each subject's query keeps
/// its own continuation state, and collecting into ordered maps makes the
/// result independent of scheduling.
pub struct Orchestrator<'a, S: EventSource> {
    source: &'a S,
    interval: ReportingInterval,
    page_limit: u32,
}

impl<'a, S: EventSource> Orchestrator<'a, S> {
    pub fn new(source: &'a S, interval: ReportingInterval) -> Self {
        Self {
            source,
            interval,
            page_limit: DEFAULT_PAGE_LIMIT,
        }
    }

    /// Run the full aggregation. `on_progress` is called after each subject
    /// completes with `(done, total, subject)`.
    ///
    /// Failures fetching the rights log or a membership list abort the run;
    /// everything past that point degrades per subject.
    pub fn run<F>(&self, on_progress: F) -> Result<AuditReport, AggregateError>
    where
        F: Fn(usize, usize, &str) + Send + Sync,
    {
        let changes = self.fetch_role_changes()?;

        // Subjects per role: current holders plus anyone whose membership
        // changed inside the interval (former and newly granted holders).
        let mut role_subjects: Vec<(Role, BTreeSet<String>)> = Vec::new();
        for role in Role::ALL {
            let mut subjects: BTreeSet<String> =
                self.source.current_holders(role)?.into_iter().collect();
            if let Some(by_subject) = changes.get(&role) {
                subjects.extend(by_subject.keys().cloned());
            }
            debug!(%role, subjects = subjects.len(), "resolved subject set");
            role_subjects.push((role, subjects));
        }

        let total: usize = role_subjects.iter().map(|(_, s)| s.len()).sum();
        let done = Arc::new(AtomicUsize::new(0));
        let on_progress = Arc::new(on_progress);

        let mut roles = Vec::new();
        for (role, subjects) in role_subjects {
            use rayon::prelude::*;

            let by_subject = changes.get(&role);
            let outcomes: BTreeMap<String, SubjectOutcome> = subjects
                .par_iter()
                .map(|subject| {
                    let events = by_subject.and_then(|m| m.get(subject));
                    let outcome = self.aggregate_subject(role, subject, events);
                    let finished = done.fetch_add(1, Ordering::SeqCst) + 1;
                    on_progress(finished, total, subject);
                    (subject.clone(), outcome)
                })
                .collect();
            roles.push(RoleReport {
                role,
                subjects: outcomes,
            });
        }

        info!(total, "aggregation finished");
        Ok(AuditReport {
            interval: self.interval.clone(),
            roles,
        })
    }

    /// Fetch the full rights log for the interval once and split it into
    /// chronologically ordered per-role, per-subject event lists. The source
    /// reports newest-first; reconstruction wants oldest-first.
    fn fetch_role_changes(
        &self,
    ) -> Result<HashMap<Role, HashMap<String, Vec<RoleChangeEvent>>>, AggregateError> {
        let events = drain_pages(|cont| {
            self.source
                .role_change_page(self.interval.window_start, self.interval.window_end, cont)
        })?;
        debug!(events = events.len(), "fetched rights log");

        let mut grouped: HashMap<Role, HashMap<String, Vec<RoleChangeEvent>>> = HashMap::new();
        for event in events {
            grouped
                .entry(event.role)
                .or_default()
                .entry(event.subject.clone())
                .or_default()
                .push(event);
        }
        for by_subject in grouped.values_mut() {
            for events in by_subject.values_mut() {
                events.sort_by_key(|e| e.timestamp);
            }
        }
        Ok(grouped)
    }

    fn aggregate_subject(
        &self,
        role: Role,
        subject: &str,
        changes: Option<&Vec<RoleChangeEvent>>,
    ) -> SubjectOutcome {
        let query = ActionQuery {
            role,
            subject: subject.to_string(),
            from: self.interval.window_start,
            to: self.interval.window_end,
            limit: self.page_limit,
        };
        let events: Vec<ActionEvent> =
            match drain_pages(|cont| self.source.action_page(&query, cont)) {
                Ok(events) => events,
                Err(err) => {
                    warn!(subject, %role, error = %err, "action fetch failed");
                    return SubjectOutcome::Failed(AggregateError::Fetch(err));
                }
            };

        let actions = match count_by_month(&events, &self.interval.months) {
            Ok(actions) => actions,
            Err(err) => {
                warn!(subject, %role, error = %err, "counting failed");
                return SubjectOutcome::Failed(err);
            }
        };

        // A consistency violation only loses the tenure windows; the counts
        // above are still worth reporting.
        let membership = match changes {
            None => MembershipState::Continuous,
            Some(events) => match reconstruct_windows(events, &self.interval) {
                Ok(windows) => MembershipState::Windows(windows),
                Err(err) => {
                    warn!(subject, %role, error = %err, "membership window unknown");
                    MembershipState::Unknown
                }
            },
        };

        SubjectOutcome::Complete(SubjectRecord {
            subject: subject.to_string(),
            actions,
            membership,
        })
    }
}
