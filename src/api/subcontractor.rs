use crate::{
    auth::auth::AuthUser,
    error::{ApiError, ApiResult, created, ok},
    model::{
        employee::RecordStatus,
        subcontractor::{SUBCONTRACTOR_UPDATABLE, Subcontractor},
    },
    utils::{
        activity,
        db_utils::{Filters, build_update_sql, execute_update, status_filter},
        pagination::{Page, Pagination},
    },
};
use actix_web::{HttpResponse, web};
use serde::Deserialize;
use serde_json::{Value, json};
use sqlx::{MySql, MySqlPool, QueryBuilder};
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateSubcontractor {
    #[schema(example = "Rahim Builders Ltd")]
    pub company_name: String,
    pub contact_person: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub project_name: Option<String>,
    #[schema(example = "Shuttering")]
    pub work_type: Option<String>,
    #[schema(example = 25)]
    pub labour_count: Option<i32>,
    pub status: Option<RecordStatus>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SubcontractorQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub status: Option<String>,
    pub project: Option<String>,
    /// Matches company, contact person or work type
    pub search: Option<String>,
}

fn clean(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

async fn fetch_subcontractor(pool: &MySqlPool, id: u64) -> ApiResult<Subcontractor> {
    sqlx::query_as::<_, Subcontractor>("SELECT * FROM subcontractors WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Subcontractor not found"))
}

#[utoipa::path(
    get,
    path = "/api/admin/subcontractors",
    params(SubcontractorQuery),
    responses((status = 200, description = "Paginated subcontractor list", body = Object)),
    tag = "Subcontractor",
    security(("bearer_auth" = []))
)]
pub async fn list_subcontractors(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<SubcontractorQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_view_access()?;

    let pagination = Pagination::new(query.page, query.per_page);
    let filters = Filters::default()
        .eq("status", status_filter(query.status.as_deref())?.as_deref())
        .eq("project_name", query.project.as_deref())
        .search(
            &["company_name", "contact_person", "work_type"],
            query.search.as_deref(),
        );

    let mut count_qb = QueryBuilder::<MySql>::new("SELECT COUNT(*) FROM subcontractors");
    filters.push_where(&mut count_qb);
    let total: i64 = count_qb.build_query_scalar().fetch_one(pool.get_ref()).await?;

    let mut data_qb = QueryBuilder::<MySql>::new("SELECT * FROM subcontractors");
    filters.push_where(&mut data_qb);
    data_qb
        .push(" ORDER BY company_name ASC LIMIT ")
        .push_bind(pagination.limit())
        .push(" OFFSET ")
        .push_bind(pagination.offset());
    let items: Vec<Subcontractor> = data_qb.build_query_as().fetch_all(pool.get_ref()).await?;

    Ok(ok(Page::new(items, pagination, total)))
}

#[utoipa::path(
    post,
    path = "/api/admin/subcontractors",
    request_body = CreateSubcontractor,
    responses(
        (status = 201, description = "Subcontractor created", body = Subcontractor),
        (status = 409, description = "Company already exists")
    ),
    tag = "Subcontractor",
    security(("bearer_auth" = []))
)]
#[instrument(name = "create_subcontractor", skip(pool, payload, auth), fields(user_id = auth.user_id))]
pub async fn create_subcontractor(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateSubcontractor>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;

    let company = payload.company_name.trim();
    if company.is_empty() {
        return Err(ApiError::bad_request("company_name is required"));
    }
    if payload.labour_count.is_some_and(|c| c < 0) {
        return Err(ApiError::bad_request("labour_count cannot be negative"));
    }

    let id = sqlx::query(
        r#"
        INSERT INTO subcontractors
        (company_name, contact_person, phone, email, project_name, work_type, labour_count, status)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(company)
    .bind(clean(&payload.contact_person))
    .bind(clean(&payload.phone))
    .bind(clean(&payload.email))
    .bind(clean(&payload.project_name))
    .bind(clean(&payload.work_type))
    .bind(payload.labour_count.unwrap_or(0))
    .bind(payload.status.unwrap_or_default().to_string())
    .execute(pool.get_ref())
    .await
    .map_err(|e| match ApiError::from(e) {
        ApiError::Conflict(_) => ApiError::conflict(format!("Subcontractor '{company}' already exists")),
        other => other,
    })?
    .last_insert_id();

    info!(id, company, "Subcontractor created");
    activity::record(pool.get_ref(), &auth, "create", "subcontractor", id, Some(company.to_string())).await;

    Ok(created(fetch_subcontractor(pool.get_ref(), id).await?))
}

#[utoipa::path(
    get,
    path = "/api/admin/subcontractors/{id}",
    params(("id", Path, description = "Subcontractor ID")),
    responses(
        (status = 200, description = "Subcontractor found", body = Subcontractor),
        (status = 404, description = "Subcontractor not found")
    ),
    tag = "Subcontractor",
    security(("bearer_auth" = []))
)]
pub async fn get_subcontractor(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_view_access()?;
    Ok(ok(fetch_subcontractor(pool.get_ref(), path.into_inner()).await?))
}

#[utoipa::path(
    put,
    path = "/api/admin/subcontractors/{id}",
    params(("id", Path, description = "Subcontractor ID")),
    request_body(content = Object, example = json!({ "labour_count": 40 })),
    responses(
        (status = 200, description = "Subcontractor updated", body = Subcontractor),
        (status = 404, description = "Subcontractor not found")
    ),
    tag = "Subcontractor",
    security(("bearer_auth" = []))
)]
pub async fn update_subcontractor(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;
    let id = path.into_inner();

    let update = build_update_sql("subcontractors", &body, SUBCONTRACTOR_UPDATABLE, id)?;
    if execute_update(pool.get_ref(), update).await? == 0 {
        return Err(ApiError::not_found("Subcontractor not found"));
    }

    activity::record(pool.get_ref(), &auth, "update", "subcontractor", id, Some(body.to_string())).await;
    Ok(ok(fetch_subcontractor(pool.get_ref(), id).await?))
}

#[utoipa::path(
    delete,
    path = "/api/admin/subcontractors/{id}",
    params(("id", Path, description = "Subcontractor ID")),
    responses(
        (status = 200, description = "Successfully deleted"),
        (status = 404, description = "Subcontractor not found")
    ),
    tag = "Subcontractor",
    security(("bearer_auth" = []))
)]
pub async fn delete_subcontractor(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;
    let id = path.into_inner();

    let result = sqlx::query("DELETE FROM subcontractors WHERE id = ?")
        .bind(id)
        .execute(pool.get_ref())
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Subcontractor not found"));
    }

    activity::record(pool.get_ref(), &auth, "delete", "subcontractor", id, None).await;
    Ok(ok(json!({ "id": id })))
}
