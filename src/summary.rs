//! Daily summary delivery.
//!
//! One pass over every active board, grouped by assignee. Each owner that
//! maps to a Slack member (and has not opted out) receives a plain-text
//! digest of their pending work by direct message.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;

use crate::aggregator::Aggregator;
use crate::cache::TaskCache;
use crate::classifier::{self, find_people_column, normalize_identifier, Classification};
use crate::error::AppError;
use crate::identity::{IdentityResolver, MessageSink};
use crate::monday::Task;

// ============================================================================
// Constants
// ============================================================================

/// Pending tasks listed in a digest before collapsing the rest.
const MAX_LISTED_TASKS: usize = 5;

// ============================================================================
// Report
// ============================================================================

/// Outcome counts for one summary run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryReport {
    pub delivered: usize,
    pub skipped_unmapped: usize,
    pub skipped_opted_out: usize,
    pub failed: usize,
}

// ============================================================================
// Orchestration
// ============================================================================

pub struct DailySummary {
    aggregator: Arc<Aggregator>,
    resolver: Arc<IdentityResolver>,
    sink: Arc<dyn MessageSink>,
    cache: Arc<TaskCache>,
}

impl DailySummary {
    pub fn new(
        aggregator: Arc<Aggregator>,
        resolver: Arc<IdentityResolver>,
        sink: Arc<dyn MessageSink>,
        cache: Arc<TaskCache>,
    ) -> Self {
        Self {
            aggregator,
            resolver,
            sink,
            cache,
        }
    }

    pub async fn run(&self) -> Result<SummaryReport, AppError> {
        self.run_on(self.aggregator.today()).await
    }

    /// Aggregation failure aborts the run; per-recipient failures are counted.
    pub async fn run_on(&self, today: NaiveDate) -> Result<SummaryReport, AppError> {
        let (tasks, boards) = self.aggregator.collect_tasks().await.map_err(|e| {
            log::error!("Daily summary: aggregation failed, nothing sent: {}", e);
            e
        })?;

        let owners = group_by_owner(&tasks);
        log::info!(
            "Daily summary: {} task(s) across {} board(s), {} owner(s)",
            tasks.len(),
            boards.len(),
            owners.len()
        );

        let user_ids = self
            .resolver
            .resolve_many_messaging_user_ids(owners.iter().map(|o| o.name.as_str()))
            .await;

        let mut report = SummaryReport::default();
        let mut recipients: Vec<Recipient> = Vec::new();
        for owner in owners {
            let Some(user_id) = user_ids.get(&owner.name) else {
                log::warn!("Daily summary: no Slack user for '{}', skipping", owner.name);
                report.skipped_unmapped += 1;
                continue;
            };
            match recipients.iter_mut().find(|r| &r.user_id == user_id) {
                Some(recipient) => {
                    for task in &owner.tasks {
                        push_unique(&mut recipient.tasks, task);
                    }
                }
                None => recipients.push(Recipient {
                    user_id: user_id.clone(),
                    name: owner.name,
                    tasks: owner.tasks,
                }),
            }
        }

        for recipient in &recipients {
            if !self.cache.get_user_preferences(&recipient.user_id).notifications {
                log::info!(
                    "Daily summary: {} has notifications off, skipping",
                    recipient.user_id
                );
                report.skipped_opted_out += 1;
                continue;
            }

            let classification = classifier::classify_owned(&recipient.tasks, today);
            let text = render_digest(&recipient.name, &classification);

            match self.sink.post_message(&recipient.user_id, &text).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    log::error!(
                        "Daily summary: delivery to {} failed: {}",
                        recipient.user_id,
                        e
                    );
                    report.failed += 1;
                }
            }
        }

        log::info!(
            "Daily summary: delivered={} unmapped={} opted_out={} failed={}",
            report.delivered,
            report.skipped_unmapped,
            report.skipped_opted_out,
            report.failed
        );
        Ok(report)
    }
}

/// One assignee as written in the people column, with the tasks naming them.
struct Owner {
    /// First-seen spelling; later spellings that normalize the same join it.
    name: String,
    tasks: Vec<Task>,
}

/// Everything one Slack user receives, however many spellings point at them.
struct Recipient {
    user_id: String,
    name: String,
    tasks: Vec<Task>,
}

/// Owners in first-seen order, keyed by normalized name.
///
/// A task with several comma-separated assignees is listed under each.
fn group_by_owner(tasks: &[Task]) -> Vec<Owner> {
    let mut owners: Vec<Owner> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for task in tasks {
        let Some(text) = find_people_column(&task.column_values).and_then(|c| c.non_empty_text())
        else {
            continue;
        };
        for name in text.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            let slot = *index.entry(normalize_identifier(name)).or_insert_with(|| {
                owners.push(Owner {
                    name: name.to_string(),
                    tasks: Vec::new(),
                });
                owners.len() - 1
            });
            push_unique(&mut owners[slot].tasks, task);
        }
    }

    owners
}

fn push_unique(tasks: &mut Vec<Task>, task: &Task) {
    if !tasks.iter().any(|t| t.id == task.id) {
        tasks.push(task.clone());
    }
}

pub fn render_digest(owner: &str, classification: &Classification) -> String {
    let pending: Vec<_> = classification.my_pending().collect();
    let completed = classification.my_completed_count();

    let mut lines = vec![
        format!("Good morning, {}! Here is your task summary.", owner),
        format!("{} pending, {} completed", pending.len(), completed),
    ];

    if !classification.overdue.is_empty() {
        lines.push(format!("{} overdue", classification.overdue.len()));
    }

    for task in pending.iter().take(MAX_LISTED_TASKS) {
        let due = task
            .due_date
            .map(|d| format!(" (due {})", d.format("%Y-%m-%d")))
            .unwrap_or_default();
        lines.push(format!(
            "• {} [{}]{} on {}",
            task.task.name, task.status, due, task.task.board_name
        ));
    }

    if pending.len() > MAX_LISTED_TASKS {
        lines.push(format!("...and {} more", pending.len() - MAX_LISTED_TASKS));
    }

    lines.join("\n")
}
