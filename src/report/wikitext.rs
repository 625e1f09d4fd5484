//! Wikitext table rendering for one role's aggregated outcomes.

use crate::aggregate::{RoleReport, SubjectOutcome};
use crate::model::{MembershipState, MonthKey, ReportingInterval, Role, SubjectRecord};

use super::Highlights;

/// Row background for arbitration-committee members.
const ARB_ROW_COLOR: &str = "#ddddff";
/// Row background for ombuds-commission members.
const OMBUDS_ROW_COLOR: &str = "#ddffdd";

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Render the full table for one role: header, one row per subject sorted
/// case-insensitively, and a totals row with month-over-month change.
pub fn render_role_table(
    report: &RoleReport,
    interval: &ReportingInterval,
    highlights: &Highlights,
) -> String {
    let mut out = String::new();
    out.push_str("{| class=\"wikitable sortable\"\n");
    out.push_str("! User\n");
    for month in &interval.months {
        out.push_str(&format!("! {}\n", month_label(*month)));
    }

    let mut subjects: Vec<(&String, &SubjectOutcome)> = report.subjects.iter().collect();
    subjects.sort_by_key(|(name, _)| name.to_lowercase());

    for (subject, outcome) in subjects {
        out.push_str(&render_row(
            subject,
            outcome,
            report.role,
            interval,
            highlights,
        ));
    }

    out.push_str(&render_totals(report, interval));
    out.push_str("|}\n");
    out
}

fn month_label(month: MonthKey) -> String {
    format!("{} {}", MONTH_NAMES[month.month() as usize - 1], month.year())
}

fn render_row(
    subject: &str,
    outcome: &SubjectOutcome,
    role: Role,
    interval: &ReportingInterval,
    highlights: &Highlights,
) -> String {
    let color = if highlights.arbitrators.contains(subject) {
        Some(ARB_ROW_COLOR)
    } else if highlights.ombuds.contains(subject) {
        Some(OMBUDS_ROW_COLOR)
    } else {
        None
    };
    let mut row = match color {
        Some(color) => format!("|- style=\"background: {color}\"\n"),
        None => "|-\n".to_string(),
    };

    match outcome {
        SubjectOutcome::Complete(record) => {
            row.push_str(&format!("| {subject}"));
            if matches!(record.membership, MembershipState::Unknown) {
                row.push_str("<ref name=\"unknown-tenure\" />");
            }
            row.push('\n');
            for month in &interval.months {
                row.push_str(&render_cell(record, *month, role, interval));
            }
        }
        SubjectOutcome::Failed(_) => {
            row.push_str(&format!(
                "| {subject}\n| colspan=\"6\" | ''data unavailable''\n"
            ));
        }
    }
    row
}

/// One month's cell: blank when no tenure window touches the month, the
/// count otherwise, with a ref marker on months where the role was granted
/// or removed inside the interval.
fn render_cell(
    record: &SubjectRecord,
    month: MonthKey,
    role: Role,
    interval: &ReportingInterval,
) -> String {
    if !record.membership.active_in_month(month) {
        return "| \n".to_string();
    }
    let count = format_thousands(record.actions.get(month));
    match boundary_marker(&record.membership, month, role, interval) {
        Some(marker) => format!("| {count}<ref name=\"{marker}\" />\n"),
        None => format!("| {count}\n"),
    }
}

/// `-cu`/`-os` when a tenure window closes inside this month, `+cu`/`+os`
/// when one opens. Windows reaching the ±1-day pads outside the interval
/// never produce a marker. Removal wins when both fall in the same month.
fn boundary_marker(
    membership: &MembershipState,
    month: MonthKey,
    role: Role,
    interval: &ReportingInterval,
) -> Option<String> {
    let MembershipState::Windows(windows) = membership else {
        return None;
    };
    let removed = windows
        .iter()
        .any(|w| month.contains(w.end) && w.end <= interval.window_end);
    if removed {
        return Some(format!("-{}", role.tag()));
    }
    let granted = windows
        .iter()
        .any(|w| month.contains(w.start) && w.start >= interval.window_start);
    granted.then(|| format!("+{}", role.tag()))
}

/// Totals row: absolute per-month totals, each month after the first
/// annotated with the percent change from the previous month. Failed
/// subjects contribute nothing.
fn render_totals(report: &RoleReport, interval: &ReportingInterval) -> String {
    let totals: Vec<u64> = interval
        .months
        .iter()
        .map(|month| {
            report
                .subjects
                .values()
                .filter_map(SubjectOutcome::record)
                .map(|r| r.actions.get(*month))
                .sum()
        })
        .collect();

    let mut row = format!("|-\n!Total\n! {}\n", format_thousands(totals[0]));
    for i in 1..totals.len() {
        let this_month = totals[i];
        let last_month = totals[i - 1];
        if last_month == 0 {
            // Percent change from zero is undefined; show the bare total.
            row.push_str(&format!("! {}\n", format_thousands(this_month)));
            continue;
        }
        let percent_change =
            (this_month as f64 - last_month as f64) / last_month as f64 * 100.0;
        let color = if percent_change < 0.0 { "red" } else { "green" };
        let prefix = if percent_change < 0.0 { "" } else { "+" };
        row.push_str(&format!(
            "! {} {{{{fontcolor|{}|({}{:.1}%)}}}}\n",
            format_thousands(this_month),
            color,
            prefix,
            percent_change
        ));
    }
    row
}

/// Thousands-separated decimal rendering (`12,345`).
fn format_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
