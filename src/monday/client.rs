//! GraphQL client for the monday.com API.
//!
//! Uses reqwest with the API key in the `Authorization` header. All queries
//! target the configured `apiUrl` (`https://api.monday.com/v2` by default).

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use super::model::{
    enrich_column_values, Board, BoardWithItems, ColumnDef, CreatedItem, ItemUpdate,
    RawColumnValue, RawItem, Task,
};
use super::{MondayConfig, WorkItemService};
use crate::error::AppError;

/// monday.com API version pinned for stable response shapes.
const API_VERSION: &str = "2024-10";

const BOARDS_QUERY: &str = r#"
    query ($limit: Int, $page: Int) {
        boards(limit: $limit, page: $page) {
            id name state board_kind
        }
    }"#;

const BOARDS_WITH_ITEMS_QUERY: &str = r#"
    query ($boardIds: [ID!], $limit: Int) {
        boards(ids: $boardIds) {
            id name
            columns { id title type }
            items_page(limit: $limit) {
                items {
                    id name state
                    column_values { id type text value }
                    created_at updated_at
                }
            }
        }
    }"#;

const ITEM_QUERY: &str = r#"
    query ($itemId: [ID!]) {
        items(ids: $itemId) {
            id name state
            board { id name columns { id title type } }
            column_values { id type text value }
            created_at updated_at
        }
    }"#;

const CREATE_ITEM_MUTATION: &str = r#"
    mutation ($boardId: ID!, $itemName: String!, $columnValues: JSON) {
        create_item(board_id: $boardId, item_name: $itemName, column_values: $columnValues) {
            id name
        }
    }"#;

const UPDATE_ITEM_MUTATION: &str = r#"
    mutation ($boardId: ID!, $itemId: ID!, $columnValues: JSON!) {
        change_multiple_column_values(board_id: $boardId, item_id: $itemId, column_values: $columnValues) {
            id name
        }
    }"#;

const DELETE_ITEM_MUTATION: &str = r#"
    mutation ($itemId: ID!) {
        delete_item(item_id: $itemId) { id }
    }"#;

const ADD_UPDATE_MUTATION: &str = r#"
    mutation ($itemId: ID!, $body: String!) {
        create_update(item_id: $itemId, body: $body) { id body }
    }"#;

pub struct MondayClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    board_page_size: u32,
}

impl MondayClient {
    pub fn new(config: &MondayConfig) -> Result<Self, AppError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or(AppError::Unauthorized)?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| AppError::ConfigurationError(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key,
            board_page_size: config.board_page_size.max(1),
        })
    }

    async fn graphql<T: DeserializeOwned>(&self, query: &str, variables: Value) -> Result<T, AppError> {
        let body = json!({ "query": query, "variables": variables });
        let resp = self
            .client
            .post(&self.api_url)
            .header("Authorization", self.api_key.clone())
            .header("API-Version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                log::error!("monday.com request failed: {}", e);
                AppError::from(e)
            })?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(AppError::Unauthorized);
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            log::warn!("monday.com rate limit hit");
            return Err(AppError::ApiRateLimit);
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            log::error!("monday.com API error {}: {}", status, text);
            return Err(AppError::UpstreamStatus {
                status: status.as_u16(),
                body: text,
            });
        }

        let json: Value = resp.json().await.map_err(|e| {
            AppError::ParseError(format!("Failed to parse monday.com response: {}", e))
        })?;

        if let Some(errors) = json.get("errors") {
            log::error!("monday.com GraphQL errors: {}", errors);
            return Err(AppError::GraphQl(errors.to_string()));
        }
        if let Some(message) = json.get("error_message").and_then(Value::as_str) {
            log::error!("monday.com error: {}", message);
            return Err(AppError::GraphQl(message.to_string()));
        }

        let data = json
            .get("data")
            .cloned()
            .ok_or_else(|| AppError::ParseError("Missing 'data' in monday.com response".into()))?;

        serde_json::from_value(data)
            .map_err(|e| AppError::ParseError(format!("Failed to deserialize monday.com data: {}", e)))
    }
}

#[derive(Deserialize)]
struct BoardsResponse {
    #[serde(default)]
    boards: Vec<Board>,
}

#[derive(Deserialize)]
struct BoardsWithItemsResponse {
    #[serde(default)]
    boards: Vec<BoardNode>,
}

#[derive(Deserialize)]
struct BoardNode {
    id: String,
    name: String,
    #[serde(default)]
    columns: Vec<ColumnDef>,
    items_page: Option<ItemsPage>,
}

#[derive(Deserialize)]
struct ItemsPage {
    #[serde(default)]
    items: Vec<RawItem>,
}

#[derive(Deserialize)]
struct ItemsResponse {
    #[serde(default)]
    items: Vec<ItemNode>,
}

#[derive(Deserialize)]
struct ItemNode {
    id: String,
    name: String,
    #[serde(default)]
    state: Option<String>,
    board: Option<ItemBoard>,
    #[serde(default)]
    column_values: Vec<RawColumnValue>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    updated_at: Option<String>,
}

#[derive(Deserialize)]
struct ItemBoard {
    id: String,
    name: String,
    #[serde(default)]
    columns: Vec<ColumnDef>,
}

#[async_trait]
impl WorkItemService for MondayClient {
    async fn list_boards(&self) -> Result<Vec<Board>, AppError> {
        let mut boards = Vec::new();
        let mut page = 1u32;
        loop {
            let resp: BoardsResponse = self
                .graphql(
                    BOARDS_QUERY,
                    json!({ "limit": self.board_page_size, "page": page }),
                )
                .await?;
            let fetched = resp.boards.len();
            boards.extend(resp.boards);
            if fetched < self.board_page_size as usize {
                break;
            }
            page += 1;
        }
        log::info!("monday.com: listed {} boards over {} page(s)", boards.len(), page);
        Ok(boards)
    }

    async fn fetch_boards_with_items(
        &self,
        board_ids: &[String],
        item_limit: u32,
    ) -> Result<Vec<BoardWithItems>, AppError> {
        let resp: BoardsWithItemsResponse = self
            .graphql(
                BOARDS_WITH_ITEMS_QUERY,
                json!({ "boardIds": board_ids, "limit": item_limit }),
            )
            .await?;

        Ok(resp
            .boards
            .into_iter()
            .map(|b| BoardWithItems {
                id: b.id,
                name: b.name,
                columns: b.columns,
                items: b.items_page.map(|p| p.items).unwrap_or_default(),
            })
            .collect())
    }

    async fn get_item(&self, item_id: &str) -> Result<Option<Task>, AppError> {
        let resp: ItemsResponse = self
            .graphql(ITEM_QUERY, json!({ "itemId": [item_id] }))
            .await?;

        Ok(resp.items.into_iter().next().map(|item| {
            let (board_id, board_name, columns) = match item.board {
                Some(b) => (b.id, b.name, b.columns),
                None => (String::new(), String::new(), Vec::new()),
            };
            Task {
                id: item.id,
                name: item.name,
                state: item.state,
                board_id,
                board_name,
                column_values: enrich_column_values(&columns, item.column_values),
                created_at: item.created_at,
                updated_at: item.updated_at,
            }
        }))
    }

    async fn create_item(
        &self,
        board_id: &str,
        item_name: &str,
        column_values: &Value,
    ) -> Result<CreatedItem, AppError> {
        #[derive(Deserialize)]
        struct CreateResponse {
            create_item: CreatedItem,
        }

        // The JSON scalar expects a string-encoded object.
        let resp: CreateResponse = self
            .graphql(
                CREATE_ITEM_MUTATION,
                json!({
                    "boardId": board_id,
                    "itemName": item_name,
                    "columnValues": column_values.to_string(),
                }),
            )
            .await?;
        log::info!("monday.com: created item {} on board {}", resp.create_item.id, board_id);
        Ok(resp.create_item)
    }

    async fn update_item(
        &self,
        board_id: &str,
        item_id: &str,
        column_values: &Value,
    ) -> Result<CreatedItem, AppError> {
        #[derive(Deserialize)]
        struct UpdateResponse {
            change_multiple_column_values: CreatedItem,
        }

        let resp: UpdateResponse = self
            .graphql(
                UPDATE_ITEM_MUTATION,
                json!({
                    "boardId": board_id,
                    "itemId": item_id,
                    "columnValues": column_values.to_string(),
                }),
            )
            .await?;
        Ok(resp.change_multiple_column_values)
    }

    async fn delete_item(&self, item_id: &str) -> Result<String, AppError> {
        #[derive(Deserialize)]
        struct DeleteResponse {
            delete_item: CreatedItem,
        }

        let resp: DeleteResponse = self
            .graphql(DELETE_ITEM_MUTATION, json!({ "itemId": item_id }))
            .await?;
        Ok(resp.delete_item.id)
    }

    async fn add_update(&self, item_id: &str, body: &str) -> Result<ItemUpdate, AppError> {
        #[derive(Deserialize)]
        struct AddUpdateResponse {
            create_update: ItemUpdate,
        }

        let resp: AddUpdateResponse = self
            .graphql(ADD_UPDATE_MUTATION, json!({ "itemId": item_id, "body": body }))
            .await?;
        Ok(resp.create_update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, page_size: u32) -> MondayClient {
        MondayClient::new(&MondayConfig {
            api_key: Some("secret".to_string()),
            api_url: server.uri(),
            board_page_size: page_size,
            ..MondayConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_missing_api_key_is_unauthorized() {
        let result = MondayClient::new(&MondayConfig::default());
        assert!(matches!(result, Err(AppError::Unauthorized)));
    }

    #[tokio::test]
    async fn test_list_boards_walks_pages() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("Authorization", "secret"))
            .and(body_partial_json(json!({ "variables": { "page": 1 } })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "boards": [
                    { "id": "1", "name": "A", "state": "active", "board_kind": "public" },
                    { "id": "2", "name": "B", "state": "archived", "board_kind": "public" }
                ]}
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "variables": { "page": 2 } })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "boards": [
                    { "id": "3", "name": "C", "state": "all_users", "board_kind": "share" }
                ]}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let boards = client_for(&server, 2).list_boards().await.unwrap();
        let ids: Vec<&str> = boards.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn test_fetch_boards_with_items_flattens_items_page() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "variables": { "boardIds": ["10"], "limit": 50 } })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "boards": [{
                    "id": "10",
                    "name": "Launch",
                    "columns": [{ "id": "date4", "title": "Due", "type": "date" }],
                    "items_page": { "items": [{
                        "id": "100",
                        "name": "Ship it",
                        "state": "active",
                        "column_values": [
                            { "id": "date4", "type": "date", "text": "2026-03-01", "value": "{\"date\":\"2026-03-01\"}" }
                        ],
                        "created_at": "2026-01-01T00:00:00Z",
                        "updated_at": null
                    }]}
                }]}
            })))
            .mount(&server)
            .await;

        let boards = client_for(&server, 100)
            .fetch_boards_with_items(&["10".to_string()], 50)
            .await
            .unwrap();
        assert_eq!(boards.len(), 1);
        assert_eq!(boards[0].columns[0].title, "Due");
        assert_eq!(boards[0].items.len(), 1);
        assert_eq!(
            boards[0].items[0].column_values[0].value.as_deref(),
            Some("{\"date\":\"2026-03-01\"}")
        );
    }

    #[tokio::test]
    async fn test_graphql_errors_surface_as_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errors": [{ "message": "Field 'bogus' doesn't exist" }]
            })))
            .mount(&server)
            .await;

        let err = client_for(&server, 100).list_boards().await.unwrap_err();
        assert!(matches!(err, AppError::GraphQl(_)));
    }

    #[tokio::test]
    async fn test_status_codes_map_to_error_kinds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let err = client_for(&server, 100).list_boards().await.unwrap_err();
        assert!(matches!(err, AppError::ApiRateLimit));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_get_item_enriches_against_item_board() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "items": [{
                    "id": "7",
                    "name": "Review",
                    "state": "active",
                    "board": { "id": "1", "name": "Ops", "columns": [
                        { "id": "status", "title": "Status", "type": "status" }
                    ]},
                    "column_values": [
                        { "id": "status", "type": "status", "text": "Done", "value": null },
                        { "id": "orphan", "type": "text", "text": "x", "value": null }
                    ]
                }]}
            })))
            .mount(&server)
            .await;

        let task = client_for(&server, 100).get_item("7").await.unwrap().unwrap();
        assert_eq!(task.board_name, "Ops");
        assert_eq!(task.column_values[0].title, "Status");
        assert_eq!(task.column_values[1].title, "orphan");
        assert_eq!(task.column_values[1].column_type, "unknown");
    }

    #[tokio::test]
    async fn test_create_item_sends_string_encoded_column_values() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "variables": {
                "boardId": "1",
                "itemName": "New task",
                "columnValues": "{\"status\":{\"label\":\"Working on it\"}}"
            }})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "create_item": { "id": "55", "name": "New task" } }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let created = client_for(&server, 100)
            .create_item("1", "New task", &json!({ "status": { "label": "Working on it" } }))
            .await
            .unwrap();
        assert_eq!(created.id, "55");
    }
}
