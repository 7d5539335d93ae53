use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Subcontractor {
    pub id: u64,
    pub company_name: String,
    pub contact_person: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub project_name: Option<String>,
    pub work_type: Option<String>,
    pub labour_count: i32,
    pub status: String,
    pub upload_id: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const SUBCONTRACTOR_UPDATABLE: &[&str] = &[
    "company_name",
    "contact_person",
    "phone",
    "email",
    "project_name",
    "work_type",
    "labour_count",
    "status",
];
