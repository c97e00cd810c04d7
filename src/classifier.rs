//! Task classification: ownership matching and due-date bucketing.
//!
//! Pure and synchronous. The assignee field upstream is free text, so
//! ownership is a permissive substring heuristic. Rules run in a fixed order
//! and the first success wins:
//! 1. the full identifier appears in the assignee text;
//! 2. the identifier looks like an email and its local part appears;
//! 3. the identifier is a multi-word name and every word appears.
//!
//! False positives (one name contained in another) are a known property of
//! these rules and are kept as-is.

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::monday::{EnrichedColumnValue, Task};

/// Status shown when a task has no usable status column.
pub const UNKNOWN_STATUS: &str = "unknown";

/// Case-folded status labels that mark a task as finished.
const COMPLETED_STATUSES: [&str; 4] = ["done", "complete", "completed", "finished"];

const STATUS_TYPES: [&str; 2] = ["color", "status"];
const PEOPLE_TYPES: [&str; 3] = ["person", "multiple-person", "people"];
const DATE_TYPE: &str = "date";

/// A task plus the fields classification derives from its columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedTask {
    #[serde(flatten)]
    pub task: Task,
    pub status: String,
    pub is_my_task: bool,
    pub due_date: Option<NaiveDate>,
}

impl ClassifiedTask {
    pub fn is_completed(&self) -> bool {
        is_completed_status(&self.status)
    }
}

/// Bucketed views over one set of classified tasks.
///
/// Buckets overlap freely; urgency buckets ignore `is_my_task` and the
/// presentation layer decides which to show.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub my_tasks: Vec<Arc<ClassifiedTask>>,
    pub overdue: Vec<Arc<ClassifiedTask>>,
    pub due_today: Vec<Arc<ClassifiedTask>>,
    pub due_this_week: Vec<Arc<ClassifiedTask>>,
    pub completed: Vec<Arc<ClassifiedTask>>,
    pub unassigned: Vec<Arc<ClassifiedTask>>,
    pub all_tasks: Vec<Arc<ClassifiedTask>>,
}

impl Classification {
    pub fn is_empty(&self) -> bool {
        self.all_tasks.is_empty()
    }

    /// My tasks that are not finished, in due-date order.
    pub fn my_pending(&self) -> impl Iterator<Item = &Arc<ClassifiedTask>> {
        self.my_tasks.iter().filter(|t| !t.is_completed())
    }

    pub fn my_completed_count(&self) -> usize {
        self.my_tasks.iter().filter(|t| t.is_completed()).count()
    }
}

/// Today's calendar date in `timezone`, falling back to UTC for unknown names.
pub fn today_in(timezone: &str) -> NaiveDate {
    match timezone.parse::<Tz>() {
        Ok(tz) => Utc::now().with_timezone(&tz).date_naive(),
        Err(_) => {
            log::warn!("Unknown timezone '{}', using UTC for today's date", timezone);
            Utc::now().date_naive()
        }
    }
}

/// Classify `tasks` for the owner `identifier` relative to `today`.
pub fn classify(tasks: &[Task], identifier: Option<&str>, today: NaiveDate) -> Classification {
    let normalized = identifier
        .map(normalize_identifier)
        .filter(|id| !id.is_empty());
    classify_by(tasks, today, |assignee| {
        normalized
            .as_deref()
            .is_some_and(|id| matches_assignee(assignee, id))
    })
}

/// Classify tasks already attributed to one owner: every assigned task is theirs.
pub fn classify_owned(tasks: &[Task], today: NaiveDate) -> Classification {
    classify_by(tasks, today, |_| true)
}

fn classify_by(
    tasks: &[Task],
    today: NaiveDate,
    is_mine: impl Fn(&str) -> bool,
) -> Classification {
    let week_end = today + Duration::days(7);

    let mut result = Classification::default();

    for task in tasks {
        let status_col = find_status_column(&task.column_values);
        let people_col = find_people_column(&task.column_values);
        let date_col = find_date_column(&task.column_values);

        let status = status_col
            .and_then(|c| c.non_empty_text())
            .map(str::to_lowercase)
            .unwrap_or_else(|| UNKNOWN_STATUS.to_string());

        let assignee_text = people_col.and_then(|c| c.non_empty_text());

        let is_my_task = assignee_text.is_some_and(&is_mine);

        let due_date = date_col.and_then(|c| c.value.as_deref()).and_then(parse_due_date);

        let entry = Arc::new(ClassifiedTask {
            task: task.clone(),
            status,
            is_my_task,
            due_date,
        });

        if entry.is_my_task {
            result.my_tasks.push(entry.clone());
        }

        let completed = entry.is_completed();
        if completed {
            result.completed.push(entry.clone());
        }

        if assignee_text.is_none() {
            result.unassigned.push(entry.clone());
        }

        if let (Some(due), false) = (entry.due_date, completed) {
            if due < today {
                result.overdue.push(entry.clone());
            } else if due == today {
                result.due_today.push(entry.clone());
            } else if due <= week_end {
                result.due_this_week.push(entry.clone());
            }
        }

        result.all_tasks.push(entry);
    }

    sort_by_due_date(&mut result.my_tasks);
    sort_by_due_date(&mut result.overdue);
    sort_by_due_date(&mut result.due_today);
    sort_by_due_date(&mut result.due_this_week);

    log::debug!(
        "Classified {} tasks: {} mine, {} overdue, {} due today",
        result.all_tasks.len(),
        result.my_tasks.len(),
        result.overdue.len(),
        result.due_today.len()
    );

    result
}

/// Lowercase + trim, the normal form for directory identifiers.
pub fn normalize_identifier(identifier: &str) -> String {
    identifier.trim().to_lowercase()
}

/// Ownership heuristic. `identifier` must already be normalized.
pub fn matches_assignee(assignee_text: &str, identifier: &str) -> bool {
    let assignee = assignee_text.trim().to_lowercase();

    if assignee.contains(identifier) {
        return true;
    }

    if identifier.contains('@') {
        let local_part = identifier.split('@').next().unwrap_or_default();
        if !local_part.is_empty() && assignee.contains(local_part) {
            return true;
        }
    }

    if identifier.contains(' ') {
        return identifier
            .split_whitespace()
            .all(|part| assignee.contains(part));
    }

    false
}

pub fn is_completed_status(status: &str) -> bool {
    let folded = status.trim().to_lowercase();
    COMPLETED_STATUSES.contains(&folded.as_str())
}

/// Pull `date` (`YYYY-MM-DD`, optional trailing time) out of a date column payload.
pub fn parse_due_date(value: &str) -> Option<NaiveDate> {
    #[derive(Deserialize)]
    struct DatePayload {
        date: Option<String>,
    }

    let payload: DatePayload = serde_json::from_str(value).ok()?;
    let date = payload.date?;
    let day = date.get(..10).unwrap_or(&date);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

/// First column that looks like the status.
pub fn find_status_column(columns: &[EnrichedColumnValue]) -> Option<&EnrichedColumnValue> {
    columns.iter().find(|c| {
        STATUS_TYPES.contains(&c.type_name())
            || c.id.to_lowercase().contains("status")
            || c.title.to_lowercase().contains("status")
    })
}

/// First column that holds the assignee(s).
pub fn find_people_column(columns: &[EnrichedColumnValue]) -> Option<&EnrichedColumnValue> {
    columns.iter().find(|c| {
        let title = c.title.to_lowercase();
        PEOPLE_TYPES.contains(&c.type_name()) || title.contains("person") || title.contains("assignee")
    })
}

/// First column that holds the due date.
pub fn find_date_column(columns: &[EnrichedColumnValue]) -> Option<&EnrichedColumnValue> {
    columns
        .iter()
        .find(|c| c.type_name() == DATE_TYPE || c.title.to_lowercase().contains("due"))
}

fn compare_due(a: &Option<NaiveDate>, b: &Option<NaiveDate>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Ascending due date, undated last. `sort_by` is stable so discovery order
/// breaks ties.
fn sort_by_due_date(tasks: &mut [Arc<ClassifiedTask>]) {
    tasks.sort_by(|a, b| compare_due(&a.due_date, &b.due_date));
}
