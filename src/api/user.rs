use crate::{
    auth::auth::AuthUser,
    error::{ApiError, ApiResult, ok},
    model::{role::Role, user::User},
    utils::{
        activity,
        pagination::{Page, Pagination},
        role_cache::RoleCache,
    },
};
use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Serialize, ToSchema)]
pub struct Me {
    pub user_id: u64,
    pub username: String,
    pub role: Role,
    pub employee_id: Option<u64>,
}

/// Current account
#[utoipa::path(
    get,
    path = "/api/me",
    responses((status = 200, description = "Authenticated account and its current role", body = Me)),
    tag = "User",
    security(("bearer_auth" = []))
)]
pub async fn me(auth: AuthUser) -> ApiResult<HttpResponse> {
    Ok(ok(Me {
        user_id: auth.user_id,
        username: auth.username,
        role: auth.role,
        employee_id: auth.employee_id,
    }))
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UserQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[utoipa::path(
    get,
    path = "/api/admin/users",
    params(UserQuery),
    responses((status = 200, description = "Paginated accounts", body = Object)),
    tag = "User",
    security(("bearer_auth" = []))
)]
pub async fn list_users(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<UserQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;

    let pagination = Pagination::new(query.page, query.per_page);
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(pool.get_ref())
        .await?;

    let users = sqlx::query_as::<_, User>(
        r#"
        SELECT id, username, role_id, employee_id, is_active, last_login_at, created_at
        FROM users
        ORDER BY id
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(pool.get_ref())
    .await?;

    Ok(ok(Page::new(users, pagination, total)))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetRole {
    pub role: Role,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetActive {
    pub is_active: bool,
}

#[utoipa::path(
    put,
    path = "/api/admin/users/{id}/role",
    params(("id", Path, description = "User ID")),
    request_body = SetRole,
    responses(
        (status = 200, description = "Role changed; takes effect on the account's next request"),
        (status = 400, description = "Admins cannot change their own role"),
        (status = 404, description = "User not found")
    ),
    tag = "User",
    security(("bearer_auth" = []))
)]
#[instrument(name = "set_user_role", skip(pool, cache, body, auth), fields(user_id = auth.user_id))]
pub async fn set_role(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<RoleCache>,
    path: web::Path<u64>,
    body: web::Json<SetRole>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;
    let target = path.into_inner();

    // keeps at least one admin around
    if target == auth.user_id {
        return Err(ApiError::bad_request("You cannot change your own role"));
    }

    let result = sqlx::query("UPDATE users SET role_id = ? WHERE id = ?")
        .bind(body.role.id())
        .bind(target)
        .execute(pool.get_ref())
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("User not found"));
    }

    cache.invalidate(target).await;
    info!(target_user = target, role = %body.role, "Role changed");
    activity::record(pool.get_ref(), &auth, "set_role", "user", target, Some(body.role.to_string())).await;

    Ok(ok(serde_json::json!({ "id": target, "role": body.role })))
}

#[utoipa::path(
    put,
    path = "/api/admin/users/{id}/active",
    params(("id", Path, description = "User ID")),
    request_body = SetActive,
    responses(
        (status = 200, description = "Account activated or deactivated"),
        (status = 400, description = "Admins cannot deactivate themselves"),
        (status = 404, description = "User not found")
    ),
    tag = "User",
    security(("bearer_auth" = []))
)]
#[instrument(name = "set_user_active", skip(pool, cache, body, auth), fields(user_id = auth.user_id))]
pub async fn set_active(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<RoleCache>,
    path: web::Path<u64>,
    body: web::Json<SetActive>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;
    let target = path.into_inner();

    if target == auth.user_id && !body.is_active {
        return Err(ApiError::bad_request("You cannot deactivate your own account"));
    }

    let result = sqlx::query("UPDATE users SET is_active = ? WHERE id = ?")
        .bind(body.is_active)
        .bind(target)
        .execute(pool.get_ref())
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("User not found"));
    }

    if !body.is_active {
        // outstanding refresh tokens die with the account
        sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE user_id = ?")
            .bind(target)
            .execute(pool.get_ref())
            .await?;
    }

    cache.invalidate(target).await;
    info!(target_user = target, is_active = body.is_active, "Account state changed");
    activity::record(
        pool.get_ref(),
        &auth,
        if body.is_active { "activate" } else { "deactivate" },
        "user",
        target,
        None,
    )
    .await;

    Ok(ok(serde_json::json!({ "id": target, "is_active": body.is_active })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[actix_web::test]
    async fn me_echoes_the_authenticated_account() {
        let resp = me(AuthUser {
            user_id: 11,
            username: "clerk".to_string(),
            role: Role::Viewer,
            employee_id: None,
        })
        .await
        .unwrap();

        let body = to_bytes(resp.into_body()).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "success": true,
                "data": { "user_id": 11, "username": "clerk", "role": "viewer", "employee_id": null }
            })
        );
    }

    #[test]
    fn role_body_uses_lowercase_names() {
        let body: SetRole = serde_json::from_str(r#"{"role": "viewer"}"#).unwrap();
        assert_eq!(body.role, Role::Viewer);
        assert!(serde_json::from_str::<SetRole>(r#"{"role": "root"}"#).is_err());
    }
}
