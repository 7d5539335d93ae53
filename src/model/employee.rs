use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RecordStatus {
    Active,
    Inactive,
}

impl Default for RecordStatus {
    fn default() -> Self {
        RecordStatus::Active
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(
    example = json!({
        "id": 1,
        "emp_id": "EMP-001",
        "name": "John Doe",
        "father_name": "Richard Doe",
        "designation": "Electrician",
        "department": "MEP",
        "project_name": "Tower A",
        "site": "North Gate",
        "phone": "+8801712345678",
        "email": "john.doe@company.com",
        "joining_date": "2024-01-01",
        "status": "active",
        "upload_id": 4,
        "created_at": "2026-01-01T00:00:00Z",
        "updated_at": "2026-01-01T00:00:00Z"
    })
)]
pub struct Employee {
    pub id: u64,
    pub emp_id: String,
    pub name: String,
    pub father_name: Option<String>,
    pub designation: Option<String>,
    pub department: Option<String>,
    pub project_name: Option<String>,
    pub site: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub joining_date: Option<NaiveDate>,
    pub status: String,
    pub upload_id: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Columns an admin may change through the partial update endpoint.
pub const EMPLOYEE_UPDATABLE: &[&str] = &[
    "emp_id",
    "name",
    "father_name",
    "designation",
    "department",
    "project_name",
    "site",
    "phone",
    "email",
    "joining_date",
    "status",
];
