use crate::{
    auth::auth::AuthUser,
    error::{ApiError, ApiResult, created, ok},
    model::{
        employee::RecordStatus,
        supply_labour::{SUPPLY_LABOUR_UPDATABLE, SupplyLabour},
    },
    utils::{
        activity,
        db_utils::{Filters, build_update_sql, execute_update, status_filter},
        pagination::{Page, Pagination},
    },
};
use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{Value, json};
use sqlx::{MySql, MySqlPool, QueryBuilder};
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateSupplyLabour {
    #[schema(example = "SL-104")]
    pub emp_id: String,
    #[schema(example = "Karim Uddin")]
    pub name: String,
    #[schema(example = "Best Manpower Co")]
    pub company_name: String,
    pub designation: Option<String>,
    pub project_name: Option<String>,
    pub phone: Option<String>,
    #[schema(example = "2026-01-01", format = "date", value_type = Option<String>)]
    pub joining_date: Option<NaiveDate>,
    pub status: Option<RecordStatus>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SupplyLabourQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    /// Supplying company
    pub company: Option<String>,
    pub project: Option<String>,
    pub status: Option<String>,
    pub search: Option<String>,
}

async fn fetch_supply_labour(pool: &MySqlPool, id: u64) -> ApiResult<SupplyLabour> {
    sqlx::query_as::<_, SupplyLabour>("SELECT * FROM supply_labours WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Supply labour record not found"))
}

#[utoipa::path(
    get,
    path = "/api/admin/supply-labour",
    params(SupplyLabourQuery),
    responses((status = 200, description = "Paginated supply labour list", body = Object)),
    tag = "Supply Labour",
    security(("bearer_auth" = []))
)]
pub async fn list_supply_labour(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<SupplyLabourQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_view_access()?;

    let pagination = Pagination::new(query.page, query.per_page);
    let filters = Filters::default()
        .eq("company_name", query.company.as_deref())
        .eq("project_name", query.project.as_deref())
        .eq("status", status_filter(query.status.as_deref())?.as_deref())
        .search(&["name", "emp_id", "phone"], query.search.as_deref());

    let mut count_qb = QueryBuilder::<MySql>::new("SELECT COUNT(*) FROM supply_labours");
    filters.push_where(&mut count_qb);
    let total: i64 = count_qb.build_query_scalar().fetch_one(pool.get_ref()).await?;

    let mut data_qb = QueryBuilder::<MySql>::new("SELECT * FROM supply_labours");
    filters.push_where(&mut data_qb);
    data_qb
        .push(" ORDER BY id DESC LIMIT ")
        .push_bind(pagination.limit())
        .push(" OFFSET ")
        .push_bind(pagination.offset());
    let items: Vec<SupplyLabour> = data_qb.build_query_as().fetch_all(pool.get_ref()).await?;

    Ok(ok(Page::new(items, pagination, total)))
}

#[utoipa::path(
    post,
    path = "/api/admin/supply-labour",
    request_body = CreateSupplyLabour,
    responses(
        (status = 201, description = "Supply labour record created", body = SupplyLabour),
        (status = 409, description = "emp_id already registered for this company")
    ),
    tag = "Supply Labour",
    security(("bearer_auth" = []))
)]
#[instrument(name = "create_supply_labour", skip(pool, payload, auth), fields(user_id = auth.user_id))]
pub async fn create_supply_labour(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateSupplyLabour>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;

    let (emp_id, name, company) = (
        payload.emp_id.trim(),
        payload.name.trim(),
        payload.company_name.trim(),
    );
    if emp_id.is_empty() || name.is_empty() || company.is_empty() {
        return Err(ApiError::bad_request("emp_id, name and company_name are required"));
    }

    let optional = |v: &Option<String>| {
        v.as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let id = sqlx::query(
        r#"
        INSERT INTO supply_labours
        (emp_id, name, company_name, designation, project_name, phone, joining_date, status)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(emp_id)
    .bind(name)
    .bind(company)
    .bind(optional(&payload.designation))
    .bind(optional(&payload.project_name))
    .bind(optional(&payload.phone))
    .bind(payload.joining_date)
    .bind(payload.status.unwrap_or_default().to_string())
    .execute(pool.get_ref())
    .await?
    .last_insert_id();

    info!(id, emp_id, company, "Supply labour created");
    activity::record(
        pool.get_ref(),
        &auth,
        "create",
        "supply_labour",
        id,
        Some(format!("{emp_id} @ {company}")),
    )
    .await;

    Ok(created(fetch_supply_labour(pool.get_ref(), id).await?))
}

#[utoipa::path(
    get,
    path = "/api/admin/supply-labour/{id}",
    params(("id", Path, description = "Supply labour ID")),
    responses(
        (status = 200, description = "Record found", body = SupplyLabour),
        (status = 404, description = "Record not found")
    ),
    tag = "Supply Labour",
    security(("bearer_auth" = []))
)]
pub async fn get_supply_labour(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_view_access()?;
    Ok(ok(fetch_supply_labour(pool.get_ref(), path.into_inner()).await?))
}

#[utoipa::path(
    put,
    path = "/api/admin/supply-labour/{id}",
    params(("id", Path, description = "Supply labour ID")),
    request_body(content = Object, example = json!({ "project_name": "Tower B" })),
    responses(
        (status = 200, description = "Record updated", body = SupplyLabour),
        (status = 404, description = "Record not found")
    ),
    tag = "Supply Labour",
    security(("bearer_auth" = []))
)]
pub async fn update_supply_labour(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;
    let id = path.into_inner();

    let update = build_update_sql("supply_labours", &body, SUPPLY_LABOUR_UPDATABLE, id)?;
    if execute_update(pool.get_ref(), update).await? == 0 {
        return Err(ApiError::not_found("Supply labour record not found"));
    }

    activity::record(pool.get_ref(), &auth, "update", "supply_labour", id, Some(body.to_string())).await;
    Ok(ok(fetch_supply_labour(pool.get_ref(), id).await?))
}

#[utoipa::path(
    delete,
    path = "/api/admin/supply-labour/{id}",
    params(("id", Path, description = "Supply labour ID")),
    responses(
        (status = 200, description = "Successfully deleted"),
        (status = 404, description = "Record not found")
    ),
    tag = "Supply Labour",
    security(("bearer_auth" = []))
)]
pub async fn delete_supply_labour(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;
    let id = path.into_inner();

    let result = sqlx::query("DELETE FROM supply_labours WHERE id = ?")
        .bind(id)
        .execute(pool.get_ref())
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Supply labour record not found"));
    }

    activity::record(pool.get_ref(), &auth, "delete", "supply_labour", id, None).await;
    Ok(ok(json!({ "id": id })))
}
