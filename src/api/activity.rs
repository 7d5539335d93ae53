use crate::{
    auth::auth::AuthUser,
    error::{ApiResult, ok},
    model::activity::ActivityLog,
    utils::{
        db_utils::Filters,
        pagination::{Page, Pagination},
    },
};
use actix_web::{HttpResponse, web};
use serde::Deserialize;
use sqlx::{MySql, MySqlPool, QueryBuilder};
use utoipa::IntoParams;

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ActivityQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    /// e.g. `employee`, `upload`, `user`
    pub entity: Option<String>,
    pub action: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/admin/activity",
    params(ActivityQuery),
    responses((status = 200, description = "Paginated audit trail, newest first", body = Object)),
    tag = "Activity",
    security(("bearer_auth" = []))
)]
pub async fn list_activity(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<ActivityQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;

    let pagination = Pagination::new(query.page, query.per_page);
    let filters = Filters::default()
        .eq("entity", query.entity.as_deref())
        .eq("action", query.action.as_deref());

    let mut count_qb = QueryBuilder::<MySql>::new("SELECT COUNT(*) FROM activity_logs");
    filters.push_where(&mut count_qb);
    let total: i64 = count_qb.build_query_scalar().fetch_one(pool.get_ref()).await?;

    let mut data_qb = QueryBuilder::<MySql>::new("SELECT * FROM activity_logs");
    filters.push_where(&mut data_qb);
    data_qb
        .push(" ORDER BY id DESC LIMIT ")
        .push_bind(pagination.limit())
        .push(" OFFSET ")
        .push_bind(pagination.offset());
    let entries: Vec<ActivityLog> = data_qb.build_query_as().fetch_all(pool.get_ref()).await?;

    Ok(ok(Page::new(entries, pagination, total)))
}
