//! monday.com work-item service integration.
//!
//! Boards, items and column values are read through the GraphQL API at
//! `https://api.monday.com/v2`. The aggregator and summary job only see the
//! `WorkItemService` trait so they can be exercised against in-memory fakes.

pub mod client;
pub mod model;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub use client::MondayClient;
pub use model::{
    enrich_column_values, Board, BoardState, BoardWithItems, ColumnDef, CreatedItem,
    EnrichedColumnValue, ItemUpdate, RawColumnValue, RawItem, Task,
};

const DEFAULT_API_URL: &str = "https://api.monday.com/v2";

/// monday.com configuration stored in ~/.taskpulse/config.json.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MondayConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Items fetched per board in the multi-board query.
    #[serde(default = "default_item_limit")]
    pub item_limit: u32,
    /// Page size used when walking the board catalog.
    #[serde(default = "default_board_page_size")]
    pub board_page_size: u32,
    /// Pause between board batches during aggregation.
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_item_limit() -> u32 {
    50
}

fn default_board_page_size() -> u32 {
    100
}

fn default_batch_delay_ms() -> u64 {
    100
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for MondayConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_api_url(),
            item_limit: default_item_limit(),
            board_page_size: default_board_page_size(),
            batch_delay_ms: default_batch_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Read and write access to boards and items in the work-item service.
#[async_trait]
pub trait WorkItemService: Send + Sync {
    /// Every board visible to the API key, all pages.
    async fn list_boards(&self) -> Result<Vec<Board>, AppError>;

    /// Column schema plus up to `item_limit` items for each board, one request.
    async fn fetch_boards_with_items(
        &self,
        board_ids: &[String],
        item_limit: u32,
    ) -> Result<Vec<BoardWithItems>, AppError>;

    /// A single item with its column values enriched against its board.
    async fn get_item(&self, item_id: &str) -> Result<Option<Task>, AppError>;

    async fn create_item(
        &self,
        board_id: &str,
        item_name: &str,
        column_values: &serde_json::Value,
    ) -> Result<CreatedItem, AppError>;

    /// Change several column values of one item at once.
    async fn update_item(
        &self,
        board_id: &str,
        item_id: &str,
        column_values: &serde_json::Value,
    ) -> Result<CreatedItem, AppError>;

    async fn delete_item(&self, item_id: &str) -> Result<String, AppError>;

    /// Post an update (comment) on an item.
    async fn add_update(&self, item_id: &str, body: &str) -> Result<ItemUpdate, AppError>;
}
