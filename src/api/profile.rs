use crate::{
    api::employee::fetch_employee,
    auth::auth::AuthUser,
    error::{ApiResult, ok},
};
use actix_web::{HttpResponse, web};
use sqlx::MySqlPool;

/// The caller's own employee record
#[utoipa::path(
    get,
    path = "/api/employee/profile",
    responses(
        (status = 200, description = "Linked employee record", body = Employee),
        (status = 403, description = "Not an employee account, or not linked"),
        (status = 404, description = "Linked record no longer exists")
    ),
    tag = "Employee Self-Service",
    security(("bearer_auth" = []))
)]
pub async fn my_profile(auth: AuthUser, pool: web::Data<MySqlPool>) -> ApiResult<HttpResponse> {
    let employee_id = auth.require_employee()?;
    Ok(ok(fetch_employee(pool.get_ref(), employee_id).await?))
}
