use crate::{
    auth::auth::AuthUser,
    db::{Violation, violation},
    error::{ApiError, ApiResult, created, ok},
    utils::activity,
};
use actix_web::{HttpResponse, web};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sqlx::{MySqlPool, types::Json};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema, sqlx::FromRow)]
pub struct FormatSummary {
    pub format_id: String,
    pub format_name: String,
    pub row_count: i64,
    pub picked_count: i64,
    pub created_at: DateTime<Utc>,
}

/// Template row as seen by admins, with whoever picked it.
#[derive(Debug, Serialize, ToSchema, sqlx::FromRow)]
pub struct FormatRowView {
    pub row_index: i32,
    #[schema(value_type = Object)]
    pub data: Json<Value>,
    pub picked_by: Option<u64>,
    pub emp_id: Option<String>,
    pub employee_name: Option<String>,
    pub picked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema, sqlx::FromRow)]
pub struct EmployeeFormat {
    pub format_id: String,
    pub format_name: String,
    pub row_count: i64,
    pub remaining: i64,
    /// Row this employee already holds in the format
    pub my_row_index: Option<i32>,
}

#[derive(Debug, Serialize, ToSchema, sqlx::FromRow)]
pub struct PickedRow {
    pub format_id: String,
    pub format_name: String,
    pub row_index: i32,
    #[schema(value_type = Object)]
    pub data: Json<Value>,
    pub picked_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct PickRequest {
    /// Specific row to claim; the lowest free row when omitted
    pub row_index: Option<i32>,
}

#[utoipa::path(
    get,
    path = "/api/admin/formats",
    responses((status = 200, description = "Formats with row and pick counts", body = [FormatSummary])),
    tag = "Format",
    security(("bearer_auth" = []))
)]
pub async fn list_formats(auth: AuthUser, pool: web::Data<MySqlPool>) -> ApiResult<HttpResponse> {
    auth.require_view_access()?;

    let formats = sqlx::query_as::<_, FormatSummary>(
        r#"
        SELECT
            f.format_id,
            MAX(f.format_name) AS format_name,
            COUNT(*) AS row_count,
            COUNT(p.id) AS picked_count,
            MIN(f.created_at) AS created_at
        FROM format_template_data f
        LEFT JOIN picked_template_rows p
            ON p.format_id = f.format_id AND p.row_index = f.row_index
        GROUP BY f.format_id
        ORDER BY created_at DESC
        "#,
    )
    .fetch_all(pool.get_ref())
    .await?;

    Ok(ok(formats))
}

async fn ensure_format_exists(pool: &MySqlPool, format_id: &str) -> ApiResult<()> {
    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM format_template_data WHERE format_id = ?")
        .bind(format_id)
        .fetch_one(pool)
        .await?;
    if rows == 0 {
        return Err(ApiError::not_found(format!("Format '{format_id}' not found")));
    }
    Ok(())
}

#[utoipa::path(
    get,
    path = "/api/admin/formats/{format_id}/rows",
    params(("format_id", Path, description = "Format slug")),
    responses(
        (status = 200, description = "Template rows in order, with picker details", body = [FormatRowView]),
        (status = 404, description = "Format not found")
    ),
    tag = "Format",
    security(("bearer_auth" = []))
)]
pub async fn list_format_rows(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    auth.require_view_access()?;
    let format_id = path.into_inner();
    ensure_format_exists(pool.get_ref(), &format_id).await?;

    let rows = sqlx::query_as::<_, FormatRowView>(
        r#"
        SELECT
            f.row_index,
            f.data,
            p.employee_id AS picked_by,
            e.emp_id,
            e.name AS employee_name,
            p.picked_at
        FROM format_template_data f
        LEFT JOIN picked_template_rows p
            ON p.format_id = f.format_id AND p.row_index = f.row_index
        LEFT JOIN employees e ON e.id = p.employee_id
        WHERE f.format_id = ?
        ORDER BY f.row_index
        "#,
    )
    .bind(&format_id)
    .fetch_all(pool.get_ref())
    .await?;

    Ok(ok(rows))
}

#[utoipa::path(
    delete,
    path = "/api/admin/formats/{format_id}/picks/{row_index}",
    params(
        ("format_id", Path, description = "Format slug"),
        ("row_index", Path, description = "Template row index")
    ),
    responses(
        (status = 200, description = "Row released and can be picked again"),
        (status = 404, description = "Row is not picked")
    ),
    tag = "Format",
    security(("bearer_auth" = []))
)]
#[instrument(name = "release_pick", skip(pool, auth), fields(user_id = auth.user_id))]
pub async fn release_pick(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<(String, i32)>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;
    let (format_id, row_index) = path.into_inner();

    let result = sqlx::query("DELETE FROM picked_template_rows WHERE format_id = ? AND row_index = ?")
        .bind(&format_id)
        .bind(row_index)
        .execute(pool.get_ref())
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Row is not picked"));
    }

    info!(format_id = %format_id, row_index, "Pick released");
    activity::record(
        pool.get_ref(),
        &auth,
        "release",
        "template_pick",
        format!("{format_id}#{row_index}"),
        None,
    )
    .await;

    Ok(ok(json!({ "format_id": format_id, "row_index": row_index })))
}

#[utoipa::path(
    get,
    path = "/api/employee/formats",
    responses((status = 200, description = "Formats with free rows and the caller's pick", body = [EmployeeFormat])),
    tag = "Employee Self-Service",
    security(("bearer_auth" = []))
)]
pub async fn employee_formats(auth: AuthUser, pool: web::Data<MySqlPool>) -> ApiResult<HttpResponse> {
    let employee_id = auth.require_employee()?;

    let formats = sqlx::query_as::<_, EmployeeFormat>(
        r#"
        SELECT
            f.format_id,
            MAX(f.format_name) AS format_name,
            COUNT(*) AS row_count,
            COUNT(*) - COUNT(p.id) AS remaining,
            MAX(CASE WHEN p.employee_id = ? THEN f.row_index END) AS my_row_index
        FROM format_template_data f
        LEFT JOIN picked_template_rows p
            ON p.format_id = f.format_id AND p.row_index = f.row_index
        GROUP BY f.format_id
        ORDER BY format_name
        "#,
    )
    .bind(employee_id)
    .fetch_all(pool.get_ref())
    .await?;

    Ok(ok(formats))
}

async fn fetch_pick(pool: &MySqlPool, format_id: &str, row_index: i32) -> ApiResult<PickedRow> {
    sqlx::query_as::<_, PickedRow>(
        r#"
        SELECT p.format_id, f.format_name, p.row_index, f.data, p.picked_at
        FROM picked_template_rows p
        JOIN format_template_data f ON f.format_id = p.format_id AND f.row_index = p.row_index
        WHERE p.format_id = ? AND p.row_index = ?
        "#,
    )
    .bind(format_id)
    .bind(row_index)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ApiError::not_found("Picked row not found"))
}

/// Claim a template row
///
/// One row per employee per format; a row can only be held by one employee.
#[utoipa::path(
    post,
    path = "/api/employee/formats/{format_id}/pick",
    params(("format_id", Path, description = "Format slug")),
    request_body(content = PickRequest, description = "Optional; omit to take the lowest free row"),
    responses(
        (status = 201, description = "Row claimed", body = PickedRow),
        (status = 404, description = "Format or requested row not found"),
        (status = 409, description = "Already picked in this format, row taken, or no rows left")
    ),
    tag = "Employee Self-Service",
    security(("bearer_auth" = []))
)]
#[instrument(name = "pick_row", skip(pool, body, auth), fields(user_id = auth.user_id))]
pub async fn pick_row(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<String>,
    body: Option<web::Json<PickRequest>>,
) -> ApiResult<HttpResponse> {
    let employee_id = auth.require_employee()?;
    let format_id = path.into_inner();
    let requested = body.and_then(|b| b.into_inner().row_index);

    if requested.is_some_and(|r| r < 0) {
        return Err(ApiError::bad_request("row_index cannot be negative"));
    }

    ensure_format_exists(pool.get_ref(), &format_id).await?;

    let held: Option<i32> = sqlx::query_scalar(
        "SELECT row_index FROM picked_template_rows WHERE format_id = ? AND employee_id = ?",
    )
    .bind(&format_id)
    .bind(employee_id)
    .fetch_optional(pool.get_ref())
    .await?;
    if let Some(row_index) = held {
        return Err(ApiError::conflict(format!(
            "You already picked row {row_index} in this format"
        )));
    }

    let row_index = match requested {
        Some(row_index) => {
            let state: Option<i64> = sqlx::query_scalar(
                r#"
                SELECT COUNT(p.id)
                FROM format_template_data f
                LEFT JOIN picked_template_rows p
                    ON p.format_id = f.format_id AND p.row_index = f.row_index
                WHERE f.format_id = ? AND f.row_index = ?
                GROUP BY f.id
                "#,
            )
            .bind(&format_id)
            .bind(row_index)
            .fetch_optional(pool.get_ref())
            .await?;

            match state {
                None => return Err(ApiError::not_found(format!("Row {row_index} not found"))),
                Some(picked) if picked > 0 => {
                    return Err(ApiError::conflict(format!("Row {row_index} is already picked")));
                }
                Some(_) => row_index,
            }
        }
        None => sqlx::query_scalar::<_, i32>(
            r#"
            SELECT f.row_index
            FROM format_template_data f
            LEFT JOIN picked_template_rows p
                ON p.format_id = f.format_id AND p.row_index = f.row_index
            WHERE f.format_id = ? AND p.id IS NULL
            ORDER BY f.row_index
            LIMIT 1
            "#,
        )
        .bind(&format_id)
        .fetch_optional(pool.get_ref())
        .await?
        .ok_or_else(|| ApiError::conflict("No rows left in this format"))?,
    };

    // The unique keys settle races between concurrent pickers
    if let Err(e) = sqlx::query(
        "INSERT INTO picked_template_rows (format_id, row_index, employee_id) VALUES (?, ?, ?)",
    )
    .bind(&format_id)
    .bind(row_index)
    .bind(employee_id)
    .execute(pool.get_ref())
    .await
    {
        return Err(pick_insert_error(e, &format_id, row_index));
    }

    info!(format_id = %format_id, row_index, employee_id, "Row picked");

    Ok(created(fetch_pick(pool.get_ref(), &format_id, row_index).await?))
}

fn pick_insert_error(e: sqlx::Error, format_id: &str, row_index: i32) -> ApiError {
    match violation(&e) {
        Some(Violation::Unique) => {
            warn!(format_id = %format_id, row_index, "Pick lost a race");
            ApiError::conflict("Row was just picked, try again")
        }
        // employee deleted after the caller's token was issued
        Some(Violation::ForeignKey) => {
            warn!(format_id = %format_id, row_index, "Pick references a removed record");
            ApiError::not_found("Employee record no longer exists")
        }
        _ => e.into(),
    }
}

#[utoipa::path(
    get,
    path = "/api/employee/picks",
    responses((status = 200, description = "Rows the caller has picked, newest first", body = [PickedRow])),
    tag = "Employee Self-Service",
    security(("bearer_auth" = []))
)]
pub async fn my_picks(auth: AuthUser, pool: web::Data<MySqlPool>) -> ApiResult<HttpResponse> {
    let employee_id = auth.require_employee()?;

    let picks = sqlx::query_as::<_, PickedRow>(
        r#"
        SELECT p.format_id, f.format_name, p.row_index, f.data, p.picked_at
        FROM picked_template_rows p
        JOIN format_template_data f ON f.format_id = p.format_id AND f.row_index = p.row_index
        WHERE p.employee_id = ?
        ORDER BY p.picked_at DESC
        "#,
    )
    .bind(employee_id)
    .fetch_all(pool.get_ref())
    .await?;

    Ok(ok(picks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::jwt::{TokenSubject, generate_access_token},
        auth::middleware::auth_middleware,
        config::Config,
        model::role::Role,
        utils::role_cache::{AccountState, RoleCache},
    };
    use actix_web::{App, http::StatusCode, middleware::from_fn, test};
    use std::time::Duration;

    const SECRET: &str = "format-secret";

    #[actix_web::test]
    async fn viewer_cannot_pick_or_list_own_picks() {
        let config = Config::from_lookup(|key| match key {
            "SERVER_ADDR" => Some("127.0.0.1:0".to_string()),
            "DATABASE_URL" => Some("mysql://root@localhost/workforce".to_string()),
            "JWT_SECRET" => Some(SECRET.to_string()),
            _ => None,
        })
        .unwrap();

        let cache = RoleCache::new(Duration::from_secs(60));
        cache
            .insert(
                9,
                AccountState {
                    role: Role::Viewer,
                    is_active: true,
                    employee_id: Some(1),
                },
            )
            .await;

        let token = generate_access_token(
            &TokenSubject {
                user_id: 9,
                username: "viewer".to_string(),
                role: Role::Viewer.id(),
                employee_id: Some(1),
            },
            SECRET,
            900,
        )
        .unwrap();

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(config))
                .app_data(web::Data::new(cache))
                .app_data(web::Data::new(
                    MySqlPool::connect_lazy("mysql://root@localhost/workforce").unwrap(),
                ))
                .service(
                    web::scope("/api")
                        .wrap(from_fn(auth_middleware))
                        .route("/employee/formats/{format_id}/pick", web::post().to(pick_row))
                        .route("/employee/picks", web::get().to(my_picks)),
                ),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/employee/formats/induction/pick")
            .insert_header(("Authorization", format!("Bearer {token}")))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let req = test::TestRequest::get()
            .uri("/api/employee/picks")
            .insert_header(("Authorization", format!("Bearer {token}")))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn pick_body_is_optional_fields() {
        let body: PickRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(body.row_index, None);

        let body: PickRequest = serde_json::from_str(r#"{"row_index": 3}"#).unwrap();
        assert_eq!(body.row_index, Some(3));
    }

    #[actix_web::test]
    async fn pick_insert_failures_are_told_apart() {
        use crate::db::testing::db_error;
        use actix_web::ResponseError;

        let raced = pick_insert_error(
            db_error(1062, "Duplicate entry 'f-1-4' for key 'picked_template_rows.uq_picked_row'"),
            "f-1",
            4,
        );
        assert_eq!(raced.status_code(), StatusCode::CONFLICT);

        let gone = pick_insert_error(db_error(1452, "Cannot add or update a child row"), "f-1", 4);
        assert_eq!(gone.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(gone.to_string(), "Employee record no longer exists");

        let other = pick_insert_error(db_error(1213, "Deadlock found"), "f-1", 4);
        assert_eq!(other.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
