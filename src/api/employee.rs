use crate::{
    auth::auth::AuthUser,
    error::{ApiError, ApiResult, created, ok},
    model::employee::{EMPLOYEE_UPDATABLE, Employee, RecordStatus},
    utils::{
        activity,
        db_utils::{Filters, build_update_sql, execute_update, status_filter},
        pagination::{Page, Pagination},
    },
};
use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sqlx::{MySql, MySqlPool, QueryBuilder};
use tracing::{debug, info, instrument};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateEmployee {
    #[schema(example = "EMP-001")]
    pub emp_id: String,
    #[schema(example = "John Doe")]
    pub name: String,
    pub father_name: Option<String>,
    #[schema(example = "Electrician")]
    pub designation: Option<String>,
    pub department: Option<String>,
    #[schema(example = "Tower A")]
    pub project_name: Option<String>,
    pub site: Option<String>,
    pub phone: Option<String>,
    #[schema(example = "john@email.com", format = "email")]
    pub email: Option<String>,
    #[schema(example = "2026-01-01", format = "date", value_type = Option<String>)]
    pub joining_date: Option<NaiveDate>,
    pub status: Option<RecordStatus>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EmployeeQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    /// `active` or `inactive`
    pub status: Option<String>,
    pub project: Option<String>,
    pub department: Option<String>,
    /// Matches name, employee code, email or phone
    pub search: Option<String>,
}

#[derive(Debug, Serialize, ToSchema, sqlx::FromRow)]
pub struct EmployeeStats {
    pub total: i64,
    pub active: i64,
    pub inactive: i64,
}

const SEARCH_COLUMNS: &[&str] = &["name", "emp_id", "email", "phone"];

fn trimmed(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Create Employee
#[utoipa::path(
    post,
    path = "/api/admin/employees",
    request_body = CreateEmployee,
    responses(
        (status = 201, description = "Employee created", body = Employee),
        (status = 400, description = "Missing emp_id or name"),
        (status = 409, description = "emp_id already exists")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
#[instrument(name = "create_employee", skip(pool, payload, auth), fields(user_id = auth.user_id))]
pub async fn create_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateEmployee>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;

    let emp_id = payload.emp_id.trim();
    let name = payload.name.trim();
    if emp_id.is_empty() || name.is_empty() {
        return Err(ApiError::bad_request("emp_id and name are required"));
    }

    let result = sqlx::query(
        r#"
        INSERT INTO employees
        (emp_id, name, father_name, designation, department, project_name, site, phone, email, joining_date, status)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(emp_id)
    .bind(name)
    .bind(trimmed(&payload.father_name))
    .bind(trimmed(&payload.designation))
    .bind(trimmed(&payload.department))
    .bind(trimmed(&payload.project_name))
    .bind(trimmed(&payload.site))
    .bind(trimmed(&payload.phone))
    .bind(trimmed(&payload.email))
    .bind(payload.joining_date)
    .bind(payload.status.unwrap_or_default().to_string())
    .execute(pool.get_ref())
    .await
    .map_err(|e| match ApiError::from(e) {
        ApiError::Conflict(_) => ApiError::conflict(format!("Employee '{emp_id}' already exists")),
        other => other,
    })?;

    let id = result.last_insert_id();
    let employee = fetch_employee(pool.get_ref(), id).await?;

    info!(id, emp_id, "Employee created");
    activity::record(pool.get_ref(), &auth, "create", "employee", id, Some(emp_id.to_string())).await;

    Ok(created(employee))
}

#[utoipa::path(
    get,
    path = "/api/admin/employees",
    params(EmployeeQuery),
    responses(
        (status = 200, description = "Paginated employee list", body = Object, example = json!({
            "success": true,
            "data": { "items": [], "page": 1, "per_page": 20, "total": 0, "total_pages": 0 }
        })),
        (status = 400, description = "Invalid status filter")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn list_employees(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<EmployeeQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_view_access()?;

    let pagination = Pagination::new(query.page, query.per_page);
    let filters = Filters::default()
        .eq("status", status_filter(query.status.as_deref())?.as_deref())
        .eq("project_name", query.project.as_deref())
        .eq("department", query.department.as_deref())
        .search(SEARCH_COLUMNS, query.search.as_deref());

    let mut count_qb = QueryBuilder::<MySql>::new("SELECT COUNT(*) FROM employees");
    filters.push_where(&mut count_qb);
    debug!(sql = %count_qb.sql(), "Counting employees");
    let total: i64 = count_qb.build_query_scalar().fetch_one(pool.get_ref()).await?;

    let mut data_qb = QueryBuilder::<MySql>::new("SELECT * FROM employees");
    filters.push_where(&mut data_qb);
    data_qb
        .push(" ORDER BY id DESC LIMIT ")
        .push_bind(pagination.limit())
        .push(" OFFSET ")
        .push_bind(pagination.offset());
    let employees: Vec<Employee> = data_qb.build_query_as().fetch_all(pool.get_ref()).await?;

    Ok(ok(Page::new(employees, pagination, total)))
}

#[utoipa::path(
    get,
    path = "/api/admin/employees/stats",
    responses((status = 200, description = "Employee counts by status", body = EmployeeStats)),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn employee_stats(auth: AuthUser, pool: web::Data<MySqlPool>) -> ApiResult<HttpResponse> {
    auth.require_view_access()?;

    let stats = sqlx::query_as::<_, EmployeeStats>(
        r#"
        SELECT
            COUNT(*) AS total,
            COUNT(CASE WHEN status = 'active' THEN 1 END) AS active,
            COUNT(CASE WHEN status = 'inactive' THEN 1 END) AS inactive
        FROM employees
        "#,
    )
    .fetch_one(pool.get_ref())
    .await?;

    Ok(ok(stats))
}

pub(crate) async fn fetch_employee(pool: &MySqlPool, id: u64) -> ApiResult<Employee> {
    sqlx::query_as::<_, Employee>("SELECT * FROM employees WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Employee not found"))
}

/// Get Employee by ID
#[utoipa::path(
    get,
    path = "/api/admin/employees/{id}",
    params(("id", Path, description = "Employee ID")),
    responses(
        (status = 200, description = "Employee found", body = Employee),
        (status = 404, description = "Employee not found", body = Object, example = json!({
            "error": "Employee not found"
        }))
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn get_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_view_access()?;
    let employee = fetch_employee(pool.get_ref(), path.into_inner()).await?;
    Ok(ok(employee))
}

/// Update Employee
///
/// Partial update: only the supplied fields change.
#[utoipa::path(
    put,
    path = "/api/admin/employees/{id}",
    params(("id", Path, description = "Employee ID")),
    request_body(content = Object, example = json!({ "designation": "Foreman", "status": "inactive" })),
    responses(
        (status = 200, description = "Employee updated", body = Employee),
        (status = 400, description = "Unknown field or invalid value"),
        (status = 404, description = "Employee not found")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
#[instrument(name = "update_employee", skip(pool, body, auth), fields(user_id = auth.user_id))]
pub async fn update_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;
    let id = path.into_inner();

    let update = build_update_sql("employees", &body, EMPLOYEE_UPDATABLE, id)?;
    let affected = execute_update(pool.get_ref(), update).await?;
    if affected == 0 {
        return Err(ApiError::not_found("Employee not found"));
    }

    let employee = fetch_employee(pool.get_ref(), id).await?;
    activity::record(pool.get_ref(), &auth, "update", "employee", id, Some(body.to_string())).await;

    Ok(ok(employee))
}

/// Delete Employee
#[utoipa::path(
    delete,
    path = "/api/admin/employees/{id}",
    params(("id", Path, description = "Employee ID")),
    responses(
        (status = 200, description = "Successfully deleted"),
        (status = 404, description = "Employee not found")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
#[instrument(name = "delete_employee", skip(pool, auth), fields(user_id = auth.user_id))]
pub async fn delete_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;
    let id = path.into_inner();

    let result = sqlx::query("DELETE FROM employees WHERE id = ?")
        .bind(id)
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Employee not found"));
    }

    info!(id, "Employee deleted");
    activity::record(pool.get_ref(), &auth, "delete", "employee", id, None).await;

    Ok(ok(json!({ "id": id })))
}

/// Trim, drop blanks, dedupe ignoring case (first spelling wins), sort ignoring case.
pub fn dedupe_projects<I>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = std::collections::HashSet::new();
    let mut projects: Vec<String> = names
        .into_iter()
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty() && seen.insert(n.to_lowercase()))
        .collect();

    projects.sort_by_key(|p| p.to_lowercase());
    projects
}

/// Employee spellings first, then supply labour, oldest rows first within each.
const PROJECT_NAMES_SQL: &str = r#"
    SELECT project_name FROM (
        SELECT project_name, 0 AS source, id FROM employees WHERE project_name IS NOT NULL
        UNION ALL
        SELECT project_name, 1 AS source, id FROM supply_labours WHERE project_name IS NOT NULL
    ) AS p
    ORDER BY source, id
"#;

#[utoipa::path(
    get,
    path = "/api/admin/projects",
    responses((status = 200, description = "Distinct project names across employees and supply labour", body = [String])),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn list_projects(auth: AuthUser, pool: web::Data<MySqlPool>) -> ApiResult<HttpResponse> {
    auth.require_view_access()?;

    let names: Vec<String> = sqlx::query_scalar(PROJECT_NAMES_SQL)
        .fetch_all(pool.get_ref())
        .await?;

    Ok(ok(dedupe_projects(names)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::jwt::{TokenSubject, generate_access_token, generate_refresh_token},
        auth::middleware::auth_middleware,
        config::Config,
        model::role::Role,
        utils::role_cache::{AccountState, RoleCache},
    };
    use actix_web::{App, http::StatusCode, middleware::from_fn, test};
    use std::time::Duration;

    const SECRET: &str = "test-secret";

    fn config() -> Config {
        Config::from_lookup(|key| match key {
            "SERVER_ADDR" => Some("127.0.0.1:0".to_string()),
            "DATABASE_URL" => Some("mysql://root@localhost/workforce".to_string()),
            "JWT_SECRET" => Some(SECRET.to_string()),
            _ => None,
        })
        .unwrap()
    }

    async fn cache_with(user_id: u64, role: Role, is_active: bool) -> RoleCache {
        let cache = RoleCache::new(Duration::from_secs(60));
        cache
            .insert(
                user_id,
                AccountState {
                    role,
                    is_active,
                    employee_id: None,
                },
            )
            .await;
        cache
    }

    fn subject(user_id: u64, role: Role) -> TokenSubject {
        TokenSubject {
            user_id,
            username: format!("user{user_id}"),
            role: role.id(),
            employee_id: None,
        }
    }

    fn access_token(user_id: u64, role: Role) -> String {
        generate_access_token(&subject(user_id, role), SECRET, 900).unwrap()
    }

    macro_rules! app {
        ($cache:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new(config()))
                    .app_data(web::Data::new($cache))
                    .app_data(web::Data::new(
                        MySqlPool::connect_lazy("mysql://root@localhost/workforce").unwrap(),
                    ))
                    .service(
                        web::scope("/api")
                            .wrap(from_fn(auth_middleware))
                            .route("/admin/employees", web::post().to(create_employee))
                            .route("/admin/employees", web::get().to(list_employees)),
                    ),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn missing_token_is_401() {
        let app = app!(RoleCache::new(Duration::from_secs(60)));
        let req = test::TestRequest::get().uri("/api/admin/employees").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn garbage_token_is_401() {
        let app = app!(RoleCache::new(Duration::from_secs(60)));
        let req = test::TestRequest::get()
            .uri("/api/admin/employees")
            .insert_header(("Authorization", "Bearer not-a-jwt"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn refresh_token_cannot_call_the_api() {
        let app = app!(cache_with(1, Role::Admin, true).await);
        let (refresh, _) = generate_refresh_token(&subject(1, Role::Admin), SECRET, 900).unwrap();
        let req = test::TestRequest::get()
            .uri("/api/admin/employees")
            .insert_header(("Authorization", format!("Bearer {refresh}")))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn viewer_cannot_create() {
        let app = app!(cache_with(2, Role::Viewer, true).await);
        let req = test::TestRequest::post()
            .uri("/api/admin/employees")
            .insert_header(("Authorization", format!("Bearer {}", access_token(2, Role::Viewer))))
            .set_json(json!({ "emp_id": "EMP-9", "name": "Nope" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body, json!({ "error": "Admin access required" }));
    }

    #[actix_web::test]
    async fn current_role_wins_over_token_role() {
        // token still says admin, the account has since been demoted to employee
        let app = app!(cache_with(3, Role::Employee, true).await);
        let req = test::TestRequest::get()
            .uri("/api/admin/employees")
            .insert_header(("Authorization", format!("Bearer {}", access_token(3, Role::Admin))))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn disabled_account_is_403() {
        let app = app!(cache_with(4, Role::Admin, false).await);
        let req = test::TestRequest::get()
            .uri("/api/admin/employees")
            .insert_header(("Authorization", format!("Bearer {}", access_token(4, Role::Admin))))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body, json!({ "error": "Account is disabled" }));
    }

    #[actix_web::test]
    async fn projects_are_deduped_case_insensitively() {
        let names = vec![
            " Tower A ".to_string(),
            "tower a".to_string(),
            "".to_string(),
            "bridge".to_string(),
            "Airport".to_string(),
        ];
        assert_eq!(dedupe_projects(names), vec!["Airport", "bridge", "Tower A"]);
    }

    #[actix_web::test]
    async fn first_spelling_comes_from_the_oldest_employee_row() {
        let sql = PROJECT_NAMES_SQL.split_whitespace().collect::<Vec<_>>().join(" ");
        assert!(sql.contains("UNION ALL"));
        assert!(sql.ends_with("ORDER BY source, id"));
        assert!(sql.find("FROM employees") < sql.find("FROM supply_labours"));

        // rows arrive in that order, so the employee spelling is kept
        let names = vec!["Tower A".to_string(), "TOWER A".to_string(), "tower a".to_string()];
        assert_eq!(dedupe_projects(names), vec!["Tower A"]);
    }
}
