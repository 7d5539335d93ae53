use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Labour supplied by a third-party company; unique per (emp_id, company_name).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct SupplyLabour {
    pub id: u64,
    pub emp_id: String,
    pub name: String,
    pub company_name: String,
    pub designation: Option<String>,
    pub project_name: Option<String>,
    pub phone: Option<String>,
    pub joining_date: Option<NaiveDate>,
    pub status: String,
    pub upload_id: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const SUPPLY_LABOUR_UPDATABLE: &[&str] = &[
    "emp_id",
    "name",
    "company_name",
    "designation",
    "project_name",
    "phone",
    "joining_date",
    "status",
];
