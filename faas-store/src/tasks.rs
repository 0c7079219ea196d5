use std::collections::HashMap;

use aws_sdk_dynamodb::types::AttributeValue;
use chrono::{DateTime, Utc};
use faas_types::{BuildStatus, TaskRecord};
use tracing::warn;

use crate::error::StoreError;

const ITEM_TYPE: &str = "BuildTask";

/// Canonical partition key: `ws#<workspace>`.
pub fn partition_key(workspace_id: &str) -> String {
    format!("ws#{workspace_id}")
}

/// Canonical sort key: `build#<task>`.
pub fn sort_key(task_id: &str) -> String {
    format!("build#{task_id}")
}

fn legacy_partition_key(workspace_id: &str) -> String {
    format!("WS#{workspace_id}")
}

fn legacy_sort_key(task_id: &str) -> String {
    format!("BUILD#{task_id}")
}

/// Fixed synonym table for status values written by the adjacent core
/// service. Unknown values fall back to PENDING.
fn map_status(raw: &str) -> BuildStatus {
    match raw.to_ascii_uppercase().as_str() {
        "PENDING" => BuildStatus::Pending,
        "BUILDING" | "RUNNING" | "IN_PROGRESS" => BuildStatus::Building,
        "PUSHING" => BuildStatus::Pushing,
        "DONE" | "COMPLETED" | "SUCCESS" => BuildStatus::Done,
        "FAILED" => BuildStatus::Failed,
        _ => BuildStatus::Pending,
    }
}

fn strip_key_prefix<'a>(value: &'a str, canonical: &str, legacy: &str) -> &'a str {
    value
        .strip_prefix(canonical)
        .or_else(|| value.strip_prefix(legacy))
        .unwrap_or(value)
}

/// Render a task record into the persisted attribute map. All values are
/// typed as strings; optional attributes are present only when set.
pub fn to_item(record: &TaskRecord) -> HashMap<String, AttributeValue> {
    let mut item = HashMap::new();
    item.insert(
        "PK".to_string(),
        AttributeValue::S(partition_key(&record.workspace_id)),
    );
    item.insert(
        "SK".to_string(),
        AttributeValue::S(sort_key(&record.task_id)),
    );
    item.insert("Type".to_string(), AttributeValue::S(ITEM_TYPE.to_string()));
    item.insert(
        "AppName".to_string(),
        AttributeValue::S(record.app_name.clone()),
    );
    item.insert(
        "Status".to_string(),
        AttributeValue::S(record.status.as_str().to_string()),
    );
    item.insert(
        "SourceCodePath".to_string(),
        AttributeValue::S(record.source_code_path.clone()),
    );
    item.insert(
        "CreatedAt".to_string(),
        AttributeValue::S(record.created_at.to_rfc3339()),
    );
    item.insert(
        "UpdatedAt".to_string(),
        AttributeValue::S(record.updated_at.to_rfc3339()),
    );
    if let Some(wasm_path) = &record.wasm_path {
        item.insert("WasmPath".to_string(), AttributeValue::S(wasm_path.clone()));
    }
    if let Some(image_url) = &record.image_url {
        item.insert("ImageUrl".to_string(), AttributeValue::S(image_url.clone()));
    }
    if let Some(error_message) = &record.error_message {
        item.insert(
            "ErrorMessage".to_string(),
            AttributeValue::S(error_message.clone()),
        );
    }
    item
}

fn get_string(item: &HashMap<String, AttributeValue>, pascal: &str, snake: &str) -> Option<String> {
    item.get(pascal)
        .or_else(|| item.get(snake))
        .and_then(|v| v.as_s().ok())
        .cloned()
}

fn parse_timestamp(raw: Option<String>) -> DateTime<Utc> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

/// Rebuild a task record from a persisted item. The reader accepts both this
/// service's format (`ws#`/`build#`, PascalCase attributes) and the adjacent
/// core service's format (`WS#`/`BUILD#`, snake_case attributes, legacy
/// status values).
pub fn from_item(item: &HashMap<String, AttributeValue>) -> Result<TaskRecord, StoreError> {
    let pk = get_string(item, "PK", "pk").ok_or_else(|| StoreError::DynamoDb {
        code: "MalformedItem".to_string(),
        message: "item has no PK attribute".to_string(),
    })?;
    let sk = get_string(item, "SK", "sk").ok_or_else(|| StoreError::DynamoDb {
        code: "MalformedItem".to_string(),
        message: "item has no SK attribute".to_string(),
    })?;

    let workspace_id = strip_key_prefix(&pk, "ws#", "WS#").to_string();
    let task_id = strip_key_prefix(&sk, "build#", "BUILD#").to_string();

    let status = get_string(item, "Status", "status")
        .map(|s| map_status(&s))
        .unwrap_or(BuildStatus::Pending);

    Ok(TaskRecord {
        workspace_id,
        task_id,
        app_name: get_string(item, "AppName", "app_name").unwrap_or_else(|| "unknown".to_string()),
        status,
        source_code_path: get_string(item, "SourceCodePath", "source_code_path")
            .unwrap_or_default(),
        created_at: parse_timestamp(get_string(item, "CreatedAt", "created_at")),
        updated_at: parse_timestamp(get_string(item, "UpdatedAt", "updated_at")),
        wasm_path: get_string(item, "WasmPath", "wasm_path"),
        image_url: get_string(item, "ImageUrl", "image_url"),
        error_message: get_string(item, "ErrorMessage", "error_message"),
    })
}

/// Optional fields carried by a status update. Only fields that are set are
/// written; everything else keeps its stored value.
#[derive(Clone, Debug, Default)]
pub struct TaskUpdate {
    pub wasm_path: Option<String>,
    pub image_url: Option<String>,
    pub error_message: Option<String>,
}

/// Authoritative task persistence, keyed by `(workspace, task)`.
pub struct TaskStore {
    client: aws_sdk_dynamodb::Client,
    table: String,
}

impl TaskStore {
    pub fn new(client: aws_sdk_dynamodb::Client, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }

    pub async fn connect(settings: &faas_config::Settings) -> Self {
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(settings.aws_region.clone()))
            .load()
            .await;
        Self::new(
            aws_sdk_dynamodb::Client::new(&config),
            settings.dynamodb_table.clone(),
        )
    }

    /// Unconditional put of a full task record.
    pub async fn create(&self, record: &TaskRecord) -> Result<(), StoreError> {
        self.client
            .put_item()
            .table_name(&self.table)
            .set_item(Some(to_item(record)))
            .send()
            .await
            .map_err(StoreError::dynamodb)?;
        Ok(())
    }

    /// Partial update: always refreshes Status and UpdatedAt, and writes only
    /// the optional fields that are present.
    pub async fn update_status(
        &self,
        workspace_id: &str,
        task_id: &str,
        status: BuildStatus,
        update: TaskUpdate,
    ) -> Result<(), StoreError> {
        let mut expression = String::from("SET #status = :status, UpdatedAt = :updated_at");
        let mut values = HashMap::new();
        values.insert(
            ":status".to_string(),
            AttributeValue::S(status.as_str().to_string()),
        );
        values.insert(
            ":updated_at".to_string(),
            AttributeValue::S(Utc::now().to_rfc3339()),
        );
        if let Some(wasm_path) = update.wasm_path {
            expression.push_str(", WasmPath = :wasm_path");
            values.insert(":wasm_path".to_string(), AttributeValue::S(wasm_path));
        }
        if let Some(image_url) = update.image_url {
            expression.push_str(", ImageUrl = :image_url");
            values.insert(":image_url".to_string(), AttributeValue::S(image_url));
        }
        if let Some(error_message) = update.error_message {
            expression.push_str(", ErrorMessage = :error_message");
            values.insert(
                ":error_message".to_string(),
                AttributeValue::S(error_message),
            );
        }

        self.client
            .update_item()
            .table_name(&self.table)
            .key("PK", AttributeValue::S(partition_key(workspace_id)))
            .key("SK", AttributeValue::S(sort_key(task_id)))
            .update_expression(expression)
            .expression_attribute_names("#status", "Status")
            .set_expression_attribute_values(Some(values))
            .send()
            .await
            .map_err(StoreError::dynamodb)?;
        Ok(())
    }

    /// Point read. Tries the canonical key format first, then the uppercase
    /// legacy variants; returns the first hit.
    pub async fn get(
        &self,
        workspace_id: &str,
        task_id: &str,
    ) -> Result<Option<TaskRecord>, StoreError> {
        let pks = [partition_key(workspace_id), legacy_partition_key(workspace_id)];
        let sks = [sort_key(task_id), legacy_sort_key(task_id)];
        for pk in &pks {
            for sk in &sks {
                let response = self
                    .client
                    .get_item()
                    .table_name(&self.table)
                    .key("PK", AttributeValue::S(pk.clone()))
                    .key("SK", AttributeValue::S(sk.clone()))
                    .send()
                    .await;
                let response = match response {
                    Ok(response) => response,
                    Err(e) => {
                        warn!(%pk, %sk, error = %StoreError::dynamodb(e), "point read failed, trying next key variant");
                        continue;
                    }
                };
                if let Some(item) = response.item() {
                    return from_item(item).map(Some);
                }
            }
        }
        Ok(None)
    }

    /// Prefix scan under the workspace's partition key, filtered to build
    /// tasks. Scans both the canonical and legacy key formats and
    /// concatenates; duplicates are permitted, since records may be written
    /// by an adjacent service.
    pub async fn list_by_workspace(&self, workspace_id: &str) -> Result<Vec<TaskRecord>, StoreError> {
        let mut records = Vec::new();
        let pks = [partition_key(workspace_id), legacy_partition_key(workspace_id)];
        let sk_prefixes = ["build#", "BUILD#"];
        for pk in &pks {
            for sk_prefix in &sk_prefixes {
                let response = self
                    .client
                    .query()
                    .table_name(&self.table)
                    .key_condition_expression("PK = :pk AND begins_with(SK, :sk_prefix)")
                    .expression_attribute_values(":pk", AttributeValue::S(pk.clone()))
                    .expression_attribute_values(
                        ":sk_prefix",
                        AttributeValue::S(sk_prefix.to_string()),
                    )
                    .send()
                    .await;
                let response = match response {
                    Ok(response) => response,
                    Err(e) => {
                        warn!(%pk, %sk_prefix, error = %StoreError::dynamodb(e), "workspace scan failed, skipping variant");
                        continue;
                    }
                };
                for item in response.items() {
                    match from_item(item) {
                        Ok(record) => records.push(record),
                        Err(e) => warn!(error = %e, "skipping malformed task item"),
                    }
                }
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_record() -> TaskRecord {
        let created = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap();
        TaskRecord {
            workspace_id: "ws-1".to_string(),
            task_id: "0f0e8b1c".to_string(),
            app_name: "hello".to_string(),
            status: BuildStatus::Building,
            source_code_path: "s3://bucket/build-sources/ws-1/0f0e8b1c/".to_string(),
            created_at: created,
            updated_at: created,
            wasm_path: None,
            image_url: None,
            error_message: None,
        }
    }

    #[test]
    fn key_format_is_deterministic() {
        assert_eq!(partition_key("ws-1"), "ws#ws-1");
        assert_eq!(sort_key("abc"), "build#abc");
    }

    #[test]
    fn item_roundtrip_preserves_all_fields() {
        let mut record = sample_record();
        record.status = BuildStatus::Done;
        record.wasm_path = Some("s3://bucket/build-artifacts/t/app.wasm".to_string());
        record.image_url = Some("registry/repo:abc123def456".to_string());
        record.error_message = Some("boom".to_string());

        let restored = from_item(&to_item(&record)).unwrap();
        assert_eq!(restored, record);
    }

    #[test]
    fn optional_fields_absent_when_unset() {
        let item = to_item(&sample_record());
        assert!(!item.contains_key("WasmPath"));
        assert!(!item.contains_key("ImageUrl"));
        assert!(!item.contains_key("ErrorMessage"));
        assert_eq!(item["Type"].as_s().unwrap(), "BuildTask");
        assert_eq!(item["Status"].as_s().unwrap(), "BUILDING");
    }

    #[test]
    fn reader_accepts_legacy_uppercase_and_snake_case() {
        let mut item = HashMap::new();
        item.insert("PK".to_string(), AttributeValue::S("WS#ws-9".to_string()));
        item.insert("SK".to_string(), AttributeValue::S("BUILD#t-9".to_string()));
        item.insert(
            "status".to_string(),
            AttributeValue::S("RUNNING".to_string()),
        );
        item.insert(
            "app_name".to_string(),
            AttributeValue::S("legacy-app".to_string()),
        );
        item.insert(
            "source_code_path".to_string(),
            AttributeValue::S("s3://b/k/".to_string()),
        );
        item.insert(
            "created_at".to_string(),
            AttributeValue::S("2025-06-01T10:00:00+00:00".to_string()),
        );
        item.insert(
            "updated_at".to_string(),
            AttributeValue::S("2025-06-01T10:05:00+00:00".to_string()),
        );

        let record = from_item(&item).unwrap();
        assert_eq!(record.workspace_id, "ws-9");
        assert_eq!(record.task_id, "t-9");
        assert_eq!(record.app_name, "legacy-app");
        assert_eq!(record.status, BuildStatus::Building);
        assert!(record.updated_at >= record.created_at);
    }

    #[test]
    fn legacy_status_synonyms_map_to_canonical() {
        assert_eq!(map_status("COMPLETED"), BuildStatus::Done);
        assert_eq!(map_status("SUCCESS"), BuildStatus::Done);
        assert_eq!(map_status("RUNNING"), BuildStatus::Building);
        assert_eq!(map_status("IN_PROGRESS"), BuildStatus::Building);
        assert_eq!(map_status("in_progress"), BuildStatus::Building);
        assert_eq!(map_status("PUSHING"), BuildStatus::Pushing);
        assert_eq!(map_status("garbage"), BuildStatus::Pending);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let mut item = HashMap::new();
        item.insert("PK".to_string(), AttributeValue::S("ws#w".to_string()));
        item.insert("SK".to_string(), AttributeValue::S("build#t".to_string()));

        let record = from_item(&item).unwrap();
        assert_eq!(record.app_name, "unknown");
        assert_eq!(record.status, BuildStatus::Pending);
        assert_eq!(record.source_code_path, "");
    }

    #[test]
    fn malformed_item_without_keys_is_rejected() {
        let item = HashMap::new();
        assert!(from_item(&item).is_err());
    }
}
