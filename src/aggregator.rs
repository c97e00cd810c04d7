//! Multi-board fetch-and-enrich pipeline.
//!
//! One aggregation pass: list boards, keep the active ones, fetch them in
//! batches of at most 25 ids (one GraphQL request per batch), enrich every
//! item against its own board's columns, then classify. Batches run
//! sequentially with a fixed pause in between to stay inside monday.com's
//! request quota. Any upstream failure aborts the whole pass; callers never
//! see a half-built task list.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::json;

use crate::cache::TaskCache;
use crate::classifier::{self, find_status_column, Classification};
use crate::error::AppError;
use crate::monday::{Board, BoardWithItems, CreatedItem, ItemUpdate, Task, WorkItemService};
use crate::types::Config;

/// Upper bound on board ids per combined request.
pub const MAX_BOARDS_PER_BATCH: usize = 25;

/// Status label written when a task is completed from chat.
const DONE_LABEL: &str = "Done";

/// Result of a full aggregation pass for one person.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UserTasks {
    pub tasks: Vec<Task>,
    pub boards: Vec<Board>,
    pub classified: Classification,
}

pub struct Aggregator {
    service: Arc<dyn WorkItemService>,
    cache: Arc<TaskCache>,
    item_limit: u32,
    batch_delay: Duration,
    timezone: String,
}

impl Aggregator {
    pub fn new(service: Arc<dyn WorkItemService>, cache: Arc<TaskCache>, config: &Config) -> Self {
        Self {
            service,
            cache,
            item_limit: config.monday.item_limit,
            batch_delay: Duration::from_millis(config.monday.batch_delay_ms),
            timezone: config.timezone.clone(),
        }
    }

    /// Boards whose state is `active` or `all_users`.
    pub async fn list_active_boards(&self) -> Result<Vec<Board>, AppError> {
        let boards = self.service.list_boards().await?;
        let total = boards.len();
        let active: Vec<Board> = boards.into_iter().filter(|b| b.state.is_active()).collect();
        log::info!("Aggregator: {} of {} boards active", active.len(), total);
        Ok(active)
    }

    /// Fetch schema and items for up to 25 boards in one request.
    pub async fn fetch_tasks_for_boards(
        &self,
        board_ids: &[String],
        item_limit: u32,
    ) -> Result<Vec<BoardWithItems>, AppError> {
        if board_ids.len() > MAX_BOARDS_PER_BATCH {
            return Err(AppError::ConfigurationError(format!(
                "Board batch of {} exceeds the limit of {}",
                board_ids.len(),
                MAX_BOARDS_PER_BATCH
            )));
        }
        if board_ids.is_empty() {
            return Ok(Vec::new());
        }
        self.service.fetch_boards_with_items(board_ids, item_limit).await
    }

    /// One aggregation pass without classification: every enriched task on
    /// every active board, plus the boards themselves.
    pub async fn collect_tasks(&self) -> Result<(Vec<Task>, Vec<Board>), AppError> {
        let boards = self.list_active_boards().await?;
        if boards.is_empty() {
            log::info!("Aggregator: no active boards");
            return Ok((Vec::new(), Vec::new()));
        }

        let board_ids: Vec<String> = boards.iter().map(|b| b.id.clone()).collect();
        let batch_count = board_ids.len().div_ceil(MAX_BOARDS_PER_BATCH);
        let mut tasks = Vec::new();

        for (i, batch) in board_ids.chunks(MAX_BOARDS_PER_BATCH).enumerate() {
            let start = i * MAX_BOARDS_PER_BATCH;
            log::info!(
                "Aggregator: fetching boards {}-{} of {}",
                start + 1,
                start + batch.len(),
                board_ids.len()
            );

            let fetched = self.fetch_tasks_for_boards(batch, self.item_limit).await?;
            for board in fetched {
                tasks.extend(board.into_tasks());
            }

            if i + 1 < batch_count && !self.batch_delay.is_zero() {
                tokio::time::sleep(self.batch_delay).await;
            }
        }

        log::info!("Aggregator: {} tasks across {} boards", tasks.len(), boards.len());
        Ok((tasks, boards))
    }

    /// Every task on every active board, classified for `identifier`.
    pub async fn get_all_user_tasks(&self, identifier: &str) -> Result<UserTasks, AppError> {
        let today = classifier::today_in(&self.timezone);
        self.get_all_user_tasks_on(identifier, today).await
    }

    /// Same as `get_all_user_tasks` with an explicit "today".
    pub async fn get_all_user_tasks_on(
        &self,
        identifier: &str,
        today: NaiveDate,
    ) -> Result<UserTasks, AppError> {
        let (tasks, boards) = self.collect_tasks().await.map_err(|e| {
            log::error!("Aggregator: task aggregation for '{}' failed: {}", identifier, e);
            e
        })?;
        let classified = classifier::classify(&tasks, Some(identifier), today);
        Ok(UserTasks {
            tasks,
            boards,
            classified,
        })
    }

    pub fn today(&self) -> NaiveDate {
        classifier::today_in(&self.timezone)
    }

    /// Single-board path: served from the board-item cache when warm.
    pub async fn get_board_items(&self, board_id: &str) -> Result<Vec<Task>, AppError> {
        if let Some(items) = self.cache.get_board_items(board_id) {
            return Ok(items);
        }

        let boards = self
            .fetch_tasks_for_boards(&[board_id.to_string()], self.item_limit)
            .await?;
        let items: Vec<Task> = boards.into_iter().flat_map(BoardWithItems::into_tasks).collect();
        self.cache.set_board_items(board_id, items.clone());
        Ok(items)
    }

    /// One item, served from the task cache when warm.
    pub async fn get_task(&self, item_id: &str) -> Result<Option<Task>, AppError> {
        if let Some(task) = self.cache.get_task(item_id) {
            return Ok(Some(task));
        }
        let task = self.service.get_item(item_id).await?;
        if let Some(ref t) = task {
            self.cache.set_task(t.clone());
        }
        Ok(task)
    }

    pub async fn create_task(
        &self,
        board_id: &str,
        name: &str,
        column_values: &serde_json::Value,
    ) -> Result<CreatedItem, AppError> {
        let created = self.service.create_item(board_id, name, column_values).await?;
        self.cache.invalidate_board(board_id);
        Ok(created)
    }

    pub async fn update_task(
        &self,
        board_id: &str,
        item_id: &str,
        column_values: &serde_json::Value,
    ) -> Result<CreatedItem, AppError> {
        let updated = self.service.update_item(board_id, item_id, column_values).await?;
        self.cache.invalidate_board(board_id);
        self.cache.invalidate_task(item_id);
        Ok(updated)
    }

    /// Set the item's status column to "Done".
    ///
    /// The status column is looked up on the item itself; `status` is used
    /// when the item has none.
    pub async fn complete_task(&self, board_id: &str, item_id: &str) -> Result<CreatedItem, AppError> {
        let column_id = self
            .get_task(item_id)
            .await?
            .and_then(|t| find_status_column(&t.column_values).map(|c| c.id.clone()))
            .unwrap_or_else(|| "status".to_string());

        let mut values = serde_json::Map::new();
        values.insert(column_id, json!({ "label": DONE_LABEL }));
        let updated = self
            .update_task(board_id, item_id, &serde_json::Value::Object(values))
            .await?;
        log::info!("Aggregator: completed item {} on board {}", item_id, board_id);
        Ok(updated)
    }

    pub async fn delete_task(&self, board_id: &str, item_id: &str) -> Result<String, AppError> {
        let deleted = self.service.delete_item(item_id).await?;
        self.cache.invalidate_board(board_id);
        self.cache.invalidate_task(item_id);
        Ok(deleted)
    }

    pub async fn comment_on_task(&self, item_id: &str, body: &str) -> Result<ItemUpdate, AppError> {
        self.service.add_update(item_id, body).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::monday::{BoardState, ColumnDef, RawColumnValue, RawItem};
    use crate::types::CacheConfig;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::Value;
    use std::collections::HashMap;

    /// In-memory work-item service recording every request.
    #[derive(Default)]
    pub(crate) struct FakeWorkItems {
        pub boards: Vec<Board>,
        pub contents: HashMap<String, BoardWithItems>,
        pub fail_listing: bool,
        pub fail_batch: Option<usize>,
        pub batches: Mutex<Vec<Vec<String>>>,
        pub updates: Mutex<Vec<(String, String, Value)>>,
    }

    impl FakeWorkItems {
        pub fn add_board(&mut self, id: &str, state: BoardState, items: Vec<RawItem>) {
            self.boards.push(Board {
                id: id.to_string(),
                name: format!("Board {}", id),
                state,
                board_kind: Some("public".to_string()),
                columns: vec![],
            });
            self.contents.insert(
                id.to_string(),
                BoardWithItems {
                    id: id.to_string(),
                    name: format!("Board {}", id),
                    columns: standard_columns(),
                    items,
                },
            );
        }

        pub fn batch_sizes(&self) -> Vec<usize> {
            self.batches.lock().iter().map(Vec::len).collect()
        }

        pub fn requested_ids(&self) -> Vec<String> {
            self.batches.lock().iter().flatten().cloned().collect()
        }
    }

    #[async_trait]
    impl WorkItemService for FakeWorkItems {
        async fn list_boards(&self) -> Result<Vec<Board>, AppError> {
            if self.fail_listing {
                return Err(AppError::NetworkError("connection refused".into()));
            }
            Ok(self.boards.clone())
        }

        async fn fetch_boards_with_items(
            &self,
            board_ids: &[String],
            _item_limit: u32,
        ) -> Result<Vec<BoardWithItems>, AppError> {
            let n = {
                let mut batches = self.batches.lock();
                batches.push(board_ids.to_vec());
                batches.len()
            };
            if self.fail_batch == Some(n) {
                return Err(AppError::UpstreamStatus {
                    status: 502,
                    body: "bad gateway".into(),
                });
            }
            Ok(board_ids
                .iter()
                .filter_map(|id| self.contents.get(id).cloned())
                .collect())
        }

        async fn get_item(&self, item_id: &str) -> Result<Option<Task>, AppError> {
            Ok(self
                .contents
                .values()
                .cloned()
                .flat_map(BoardWithItems::into_tasks)
                .find(|t| t.id == item_id))
        }

        async fn create_item(&self, _: &str, name: &str, _: &Value) -> Result<CreatedItem, AppError> {
            Ok(CreatedItem {
                id: "new".to_string(),
                name: Some(name.to_string()),
            })
        }

        async fn update_item(
            &self,
            board_id: &str,
            item_id: &str,
            column_values: &Value,
        ) -> Result<CreatedItem, AppError> {
            self.updates
                .lock()
                .push((board_id.to_string(), item_id.to_string(), column_values.clone()));
            Ok(CreatedItem {
                id: item_id.to_string(),
                name: None,
            })
        }

        async fn delete_item(&self, item_id: &str) -> Result<String, AppError> {
            Ok(item_id.to_string())
        }

        async fn add_update(&self, _: &str, body: &str) -> Result<ItemUpdate, AppError> {
            Ok(ItemUpdate {
                id: "u1".to_string(),
                body: Some(body.to_string()),
            })
        }
    }

    pub(crate) fn standard_columns() -> Vec<ColumnDef> {
        vec![
            ColumnDef {
                id: "status".to_string(),
                title: "Status".to_string(),
                column_type: "status".to_string(),
            },
            ColumnDef {
                id: "person".to_string(),
                title: "Person".to_string(),
                column_type: "people".to_string(),
            },
            ColumnDef {
                id: "date4".to_string(),
                title: "Due date".to_string(),
                column_type: "date".to_string(),
            },
        ]
    }

    pub(crate) fn item(id: &str, status: &str, assignee: &str, due: Option<&str>) -> RawItem {
        let mut column_values = vec![
            RawColumnValue {
                id: "status".to_string(),
                kind: Some("status".to_string()),
                text: Some(status.to_string()),
                value: None,
            },
            RawColumnValue {
                id: "person".to_string(),
                kind: Some("people".to_string()),
                text: Some(assignee.to_string()),
                value: None,
            },
        ];
        if let Some(d) = due {
            column_values.push(RawColumnValue {
                id: "date4".to_string(),
                kind: Some("date".to_string()),
                text: Some(d.to_string()),
                value: Some(format!("{{\"date\":\"{}\"}}", d)),
            });
        }
        RawItem {
            id: id.to_string(),
            name: format!("Item {}", id),
            state: Some("active".to_string()),
            column_values,
            created_at: None,
            updated_at: None,
        }
    }

    fn aggregator(fake: FakeWorkItems) -> (Aggregator, Arc<FakeWorkItems>) {
        let fake = Arc::new(fake);
        let cache = Arc::new(TaskCache::new(&CacheConfig::default()));
        (Aggregator::new(fake.clone(), cache, &Config::default()), fake)
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 10).unwrap()
    }

    #[tokio::test]
    async fn test_end_to_end_active_and_archived_boards() {
        let mut fake = FakeWorkItems::default();
        fake.add_board(
            "b1",
            BoardState::Active,
            vec![
                item("1", "Stuck", "Ada Lovelace", Some("2026-03-01")),
                item("2", "Working on it", "Grace Hopper", Some("2026-03-10")),
                item("3", "Working on it", "Ada Lovelace", None),
            ],
        );
        fake.add_board(
            "b2",
            BoardState::Archived,
            (10..15)
                .map(|i| item(&i.to_string(), "Stuck", "Ada Lovelace", Some("2026-01-01")))
                .collect(),
        );
        let (agg, fake) = aggregator(fake);

        let result = agg.get_all_user_tasks_on("ada lovelace", today()).await.unwrap();

        assert_eq!(result.boards.len(), 1);
        assert_eq!(result.boards[0].id, "b1");
        assert_eq!(result.tasks.len(), 3);
        assert_eq!(result.classified.my_tasks.len(), 2);
        assert_eq!(result.classified.overdue.len(), 1);
        assert_eq!(result.classified.due_today.len(), 1);
        assert_eq!(fake.requested_ids(), vec!["b1".to_string()]);
    }

    #[tokio::test]
    async fn test_inactive_states_never_returned() {
        let mut fake = FakeWorkItems::default();
        fake.add_board("a", BoardState::Active, vec![]);
        fake.add_board("b", BoardState::AllUsers, vec![]);
        fake.add_board("c", BoardState::Archived, vec![]);
        fake.add_board("d", BoardState::Deleted, vec![]);
        fake.add_board("e", BoardState::Other, vec![]);
        let (agg, _) = aggregator(fake);

        let result = agg.get_all_user_tasks_on("ada", today()).await.unwrap();
        let ids: Vec<&str> = result.boards.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_no_active_boards_is_empty_not_error() {
        let mut fake = FakeWorkItems::default();
        fake.add_board("c", BoardState::Archived, vec![item("1", "Stuck", "Ada", None)]);
        let (agg, fake) = aggregator(fake);

        let result = agg.get_all_user_tasks_on("ada", today()).await.unwrap();
        assert!(result.tasks.is_empty());
        assert!(result.boards.is_empty());
        assert!(result.classified.is_empty());
        assert!(fake.batch_sizes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_batches_of_25_with_pacing() {
        let mut fake = FakeWorkItems::default();
        for i in 0..60 {
            fake.add_board(&format!("b{}", i), BoardState::Active, vec![item(&format!("i{}", i), "Stuck", "Ada", None)]);
        }
        let (agg, fake) = aggregator(fake);

        let started = tokio::time::Instant::now();
        let result = agg.get_all_user_tasks_on("ada", today()).await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(fake.batch_sizes(), vec![25, 25, 10]);
        assert_eq!(result.tasks.len(), 60);
        // Two pauses between three batches, none after the last.
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_listing_failure_is_fatal() {
        let fake = FakeWorkItems {
            fail_listing: true,
            ..FakeWorkItems::default()
        };
        let (agg, _) = aggregator(fake);
        let err = agg.get_all_user_tasks_on("ada", today()).await.unwrap_err();
        assert!(matches!(err, AppError::NetworkError(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_failure_returns_no_partial_result() {
        let mut fake = FakeWorkItems {
            fail_batch: Some(2),
            ..FakeWorkItems::default()
        };
        for i in 0..30 {
            fake.add_board(&format!("b{}", i), BoardState::Active, vec![]);
        }
        let (agg, _) = aggregator(fake);
        let err = agg.get_all_user_tasks_on("ada", today()).await.unwrap_err();
        assert!(matches!(err, AppError::UpstreamStatus { status: 502, .. }));
    }

    #[tokio::test]
    async fn test_oversized_batch_rejected() {
        let (agg, fake) = aggregator(FakeWorkItems::default());
        let ids: Vec<String> = (0..26).map(|i| i.to_string()).collect();
        let err = agg.fetch_tasks_for_boards(&ids, 50).await.unwrap_err();
        assert!(matches!(err, AppError::ConfigurationError(_)));
        assert!(fake.batch_sizes().is_empty());
    }

    #[tokio::test]
    async fn test_enrichment_uses_each_boards_own_schema() {
        let mut fake = FakeWorkItems::default();
        fake.add_board("b1", BoardState::Active, vec![item("1", "Stuck", "Ada", None)]);
        fake.add_board("b2", BoardState::Active, vec![item("2", "Stuck", "Ada", None)]);
        if let Some(b2) = fake.contents.get_mut("b2") {
            b2.columns[0].title = "Phase".to_string();
        }
        let (agg, _) = aggregator(fake);

        let result = agg.get_all_user_tasks_on("ada", today()).await.unwrap();
        let titles: Vec<&str> = result
            .tasks
            .iter()
            .map(|t| t.column_values[0].title.as_str())
            .collect();
        assert_eq!(titles, vec!["Status", "Phase"]);
        assert_eq!(result.tasks[1].board_id, "b2");
    }

    #[tokio::test]
    async fn test_board_items_cached_and_invalidated_on_write() {
        let mut fake = FakeWorkItems::default();
        fake.add_board("b1", BoardState::Active, vec![item("1", "Stuck", "Ada", None)]);
        let (agg, fake) = aggregator(fake);

        assert_eq!(agg.get_board_items("b1").await.unwrap().len(), 1);
        assert_eq!(agg.get_board_items("b1").await.unwrap().len(), 1);
        assert_eq!(fake.batch_sizes(), vec![1]);

        agg.create_task("b1", "New", &json!({})).await.unwrap();
        agg.get_board_items("b1").await.unwrap();
        assert_eq!(fake.batch_sizes(), vec![1, 1]);
    }

    #[tokio::test]
    async fn test_complete_task_sets_done_on_status_column() {
        let mut fake = FakeWorkItems::default();
        fake.add_board("b1", BoardState::Active, vec![item("1", "Stuck", "Ada", None)]);
        let (agg, fake) = aggregator(fake);

        agg.complete_task("b1", "1").await.unwrap();

        let updates = fake.updates.lock();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].0, "b1");
        assert_eq!(updates[0].2, json!({ "status": { "label": "Done" } }));
    }

    #[tokio::test]
    async fn test_comment_and_delete_pass_through() {
        let (agg, _) = aggregator(FakeWorkItems::default());
        let update = agg.comment_on_task("1", "On it").await.unwrap();
        assert_eq!(update.body.as_deref(), Some("On it"));
        assert_eq!(agg.delete_task("b1", "1").await.unwrap(), "1");
    }
}
