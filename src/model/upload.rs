use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::Json;
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

/// What an uploaded workbook contains, and therefore where its rows are merged.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UploadKind {
    Employee,
    SupplyLabour,
    Subcontractor,
    FormatTemplate,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum UploadStatus {
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Upload {
    pub id: u64,
    pub file_name: String,
    pub kind: String,
    pub format_id: Option<String>,
    pub uploaded_by: u64,
    pub status: String,
    pub sheet_count: i32,
    pub row_count: i32,
    pub inserted_count: i32,
    pub updated_count: i32,
    pub skipped_count: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct UploadLog {
    pub id: u64,
    pub upload_id: u64,
    pub level: String,
    pub sheet_name: Option<String>,
    pub row_index: Option<i32>,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// One stored spreadsheet row, keyed by normalised header.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct UploadedSheet {
    pub id: u64,
    pub upload_id: u64,
    pub sheet_name: String,
    pub row_index: i32,
    #[schema(value_type = Object)]
    pub data: Json<Value>,
    pub created_at: DateTime<Utc>,
}
