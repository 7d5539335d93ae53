use chrono::NaiveDate;
use serde_json::Value;
use sqlx::{MySql, MySqlPool, QueryBuilder};
use std::str::FromStr;

use crate::error::ApiError;
use crate::ingest::mapping::parse_date;
use crate::model::employee::RecordStatus;

/// SQL bindable value
#[derive(Debug, PartialEq)]
pub enum SqlValue {
    String(String),
    I64(i64),
    U64(u64),
    F64(f64),
    Bool(bool),
    Date(NaiveDate),
    Null,
}

#[derive(Debug)]
pub struct SqlUpdate {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

/// Build `UPDATE <table> SET ... WHERE id = ?` from a JSON object.
///
/// Only keys listed in `allowed` are accepted. Columns ending in `_date` must hold a
/// date string, `status` must be `active` or `inactive`.
pub fn build_update_sql(
    table: &str,
    payload: &Value,
    allowed: &[&str],
    id_value: u64,
) -> Result<SqlUpdate, ApiError> {
    let obj = payload
        .as_object()
        .ok_or_else(|| ApiError::bad_request("Payload must be a JSON object"))?;

    if obj.is_empty() {
        return Err(ApiError::bad_request("No fields provided for update"));
    }

    if let Some(unknown) = obj.keys().find(|k| !allowed.contains(&k.as_str())) {
        return Err(ApiError::bad_request(format!("Field '{unknown}' cannot be updated")));
    }

    let set_clause = obj
        .keys()
        .map(|k| format!("{} = ?", k))
        .collect::<Vec<_>>()
        .join(", ");

    let sql = format!("UPDATE {} SET {} WHERE id = ?", table, set_clause);

    let mut values = Vec::with_capacity(obj.len() + 1);

    for (column, value) in obj {
        values.push(to_sql_value(column, value)?);
    }

    values.push(SqlValue::U64(id_value));

    Ok(SqlUpdate { sql, values })
}

/// Columns declared `NOT NULL` in the record tables.
const NOT_NULL_COLUMNS: &[&str] = &["emp_id", "name", "company_name", "labour_count", "status"];

fn to_sql_value(column: &str, value: &Value) -> Result<SqlValue, ApiError> {
    let required = NOT_NULL_COLUMNS.contains(&column);
    match value {
        Value::Null if required => Err(ApiError::bad_request(format!("{column} cannot be null"))),
        Value::String(s) if required && s.trim().is_empty() => {
            Err(ApiError::bad_request(format!("{column} cannot be blank")))
        }
        Value::String(s) if column.ends_with("_date") => parse_date(s)
            .map(SqlValue::Date)
            .ok_or_else(|| ApiError::bad_request(format!("'{column}' is not a valid date: {s}"))),
        Value::String(s) if column == "status" => RecordStatus::from_str(&s.trim().to_lowercase())
            .map(|status| SqlValue::String(status.to_string()))
            .map_err(|_| ApiError::bad_request("status must be 'active' or 'inactive'")),
        Value::String(s) => Ok(SqlValue::String(s.trim().to_string())),
        Value::Number(n) => n
            .as_i64()
            .map(SqlValue::I64)
            .or_else(|| n.as_f64().map(SqlValue::F64))
            .ok_or_else(|| ApiError::bad_request(format!("'{column}' has an unsupported number"))),
        Value::Bool(b) => Ok(SqlValue::Bool(*b)),
        Value::Null => Ok(SqlValue::Null),
        _ => Err(ApiError::bad_request("Unsupported JSON value type")),
    }
}

pub async fn execute_update(pool: &MySqlPool, update: SqlUpdate) -> Result<u64, sqlx::Error> {
    let mut query = sqlx::query(&update.sql);

    for value in update.values {
        query = match value {
            SqlValue::String(v) => query.bind(v),
            SqlValue::I64(v) => query.bind(v),
            SqlValue::U64(v) => query.bind(v),
            SqlValue::F64(v) => query.bind(v),
            SqlValue::Bool(v) => query.bind(v),
            SqlValue::Date(v) => query.bind(v),
            SqlValue::Null => query.bind(None::<String>),
        };
    }

    let result = query.execute(pool).await?;
    Ok(result.rows_affected())
}

enum Filter {
    Eq(&'static str, String),
    Search(&'static [&'static str], String),
}

/// WHERE clause for list endpoints. Blank query values are ignored.
#[derive(Default)]
pub struct Filters(Vec<Filter>);

impl Filters {
    pub fn eq(mut self, column: &'static str, value: Option<&str>) -> Self {
        if let Some(v) = value.map(str::trim).filter(|v| !v.is_empty()) {
            self.0.push(Filter::Eq(column, v.to_string()));
        }
        self
    }

    /// `LIKE %term%` across any of `columns`.
    pub fn search(mut self, columns: &'static [&'static str], term: Option<&str>) -> Self {
        if let Some(t) = term.map(str::trim).filter(|t| !t.is_empty()) {
            self.0.push(Filter::Search(columns, format!("%{t}%")));
        }
        self
    }

    pub fn push_where(&self, qb: &mut QueryBuilder<'_, MySql>) {
        for (i, filter) in self.0.iter().enumerate() {
            qb.push(if i == 0 { " WHERE " } else { " AND " });
            match filter {
                Filter::Eq(column, value) => {
                    qb.push(*column).push(" = ").push_bind(value.clone());
                }
                Filter::Search(columns, like) => {
                    qb.push("(");
                    for (j, column) in columns.iter().enumerate() {
                        if j > 0 {
                            qb.push(" OR ");
                        }
                        qb.push(*column).push(" LIKE ").push_bind(like.clone());
                    }
                    qb.push(")");
                }
            }
        }
    }
}

/// Validate a `status` query value; `None` when absent or blank.
pub fn status_filter(raw: Option<&str>) -> Result<Option<String>, ApiError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => RecordStatus::from_str(&s.to_lowercase())
            .map(|status| Some(status.to_string()))
            .map_err(|_| ApiError::bad_request("status must be 'active' or 'inactive'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ALLOWED: &[&str] = &["name", "joining_date", "status", "labour_count"];

    #[test]
    fn builds_set_clause_and_trailing_id() {
        let update = build_update_sql(
            "employees",
            &json!({ "name": " Jane ", "joining_date": "05/02/2024" }),
            ALLOWED,
            9,
        )
        .unwrap();

        assert_eq!(update.sql, "UPDATE employees SET joining_date = ?, name = ? WHERE id = ?");
        assert_eq!(
            update.values,
            vec![
                SqlValue::Date(NaiveDate::from_ymd_opt(2024, 2, 5).unwrap()),
                SqlValue::String("Jane".to_string()),
                SqlValue::U64(9),
            ]
        );
    }

    #[test]
    fn rejects_columns_outside_whitelist() {
        let err = build_update_sql("employees", &json!({ "id": 1 }), ALLOWED, 1).unwrap_err();
        assert!(err.to_string().contains("'id'"));

        let err = build_update_sql("employees", &json!({ "name = 'x'; --": 1 }), ALLOWED, 1).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[test]
    fn rejects_empty_and_non_object_payloads() {
        assert!(build_update_sql("employees", &json!({}), ALLOWED, 1).is_err());
        assert!(build_update_sql("employees", &json!([1, 2]), ALLOWED, 1).is_err());
    }

    #[test]
    fn validates_status_and_dates() {
        assert!(build_update_sql("employees", &json!({ "status": "retired" }), ALLOWED, 1).is_err());
        assert!(build_update_sql("employees", &json!({ "joining_date": "soon" }), ALLOWED, 1).is_err());

        let update = build_update_sql("employees", &json!({ "status": " Inactive " }), ALLOWED, 1).unwrap();
        assert_eq!(update.values[0], SqlValue::String("inactive".to_string()));
    }

    #[test]
    fn required_columns_reject_null_and_blank() {
        let allowed = &["emp_id", "name", "company_name", "labour_count", "phone"];

        for payload in [
            json!({ "name": null }),
            json!({ "name": "   " }),
            json!({ "emp_id": null }),
            json!({ "company_name": "" }),
            json!({ "labour_count": null }),
        ] {
            let err = build_update_sql("supply_labours", &payload, allowed, 1).unwrap_err();
            assert!(matches!(err, ApiError::BadRequest(_)), "{payload} was accepted");
        }

        let err = build_update_sql("employees", &json!({ "name": null }), allowed, 1).unwrap_err();
        assert_eq!(err.to_string(), "name cannot be null");

        let update = build_update_sql("employees", &json!({ "phone": null }), allowed, 1).unwrap();
        assert_eq!(update.values[0], SqlValue::Null);
    }

    #[test]
    fn filters_skip_blank_values() {
        let filters = Filters::default()
            .eq("status", Some("active"))
            .eq("project_name", Some("  "))
            .eq("department", None)
            .search(&["name", "emp_id"], Some(" jo "));

        let mut qb = QueryBuilder::<MySql>::new("SELECT COUNT(*) FROM employees");
        filters.push_where(&mut qb);
        assert_eq!(
            qb.sql(),
            "SELECT COUNT(*) FROM employees WHERE status = ? AND (name LIKE ? OR emp_id LIKE ?)"
        );
    }

    #[test]
    fn no_filters_no_where() {
        let mut qb = QueryBuilder::<MySql>::new("SELECT * FROM uploads");
        Filters::default().eq("kind", None).push_where(&mut qb);
        assert_eq!(qb.sql(), "SELECT * FROM uploads");
    }

    #[test]
    fn status_filter_validates() {
        assert_eq!(status_filter(None).unwrap(), None);
        assert_eq!(status_filter(Some("")).unwrap(), None);
        assert_eq!(status_filter(Some("ACTIVE")).unwrap().as_deref(), Some("active"));
        assert!(status_filter(Some("gone")).is_err());
    }
}
