use crate::{
    auth::{
        jwt::{TokenSubject, generate_access_token, generate_refresh_token, verify_token},
        password::{hash_password, verify_password},
    },
    config::Config,
    db::violates_key,
    error::{ApiError, ApiResult, created, ok},
    model::{role::Role, user::UserCredentials},
    models::{Claims, LoginReqDto, RegisterReq, TokenPair, TokenType},
    utils::role_cache::{AccountState, RoleCache},
};
use actix_web::{HttpRequest, HttpResponse, Responder, web};
use serde_json::json;
use sqlx::MySqlPool;
use tracing::{debug, error, info, instrument};

fn bearer_token(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

/// Issue an access/refresh pair and persist the refresh token's jti.
async fn issue_tokens(
    pool: &MySqlPool,
    config: &Config,
    subject: &TokenSubject,
) -> ApiResult<TokenPair> {
    let access_token = generate_access_token(subject, &config.jwt_secret, config.access_token_ttl)
        .map_err(|e| ApiError::Internal(format!("Failed to sign access token: {e}")))?;

    let (refresh_token, refresh_claims) =
        generate_refresh_token(subject, &config.jwt_secret, config.refresh_token_ttl)
            .map_err(|e| ApiError::Internal(format!("Failed to sign refresh token: {e}")))?;

    debug!(user_id = subject.user_id, jti = %refresh_claims.jti, "Storing refresh token");

    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (user_id, jti, expires_at)
        VALUES (?, ?, FROM_UNIXTIME(?))
        "#,
    )
    .bind(subject.user_id)
    .bind(&refresh_claims.jti)
    .bind(refresh_claims.exp as i64)
    .execute(pool)
    .await?;

    Ok(TokenPair {
        access_token,
        refresh_token,
    })
}

/// Register a new account
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterReq,
    responses(
        (status = 201, description = "Account created", body = Object, example = json!({
            "success": true,
            "data": { "id": 1, "username": "jdoe", "role": "admin", "employee_id": null }
        })),
        (status = 400, description = "Missing username or password"),
        (status = 404, description = "Unknown employee code"),
        (status = 409, description = "Username taken or employee already linked")
    ),
    tag = "Auth"
)]
#[instrument(name = "auth_register", skip(pool, body), fields(username = %body.username))]
pub async fn register(
    body: web::Json<RegisterReq>,
    pool: web::Data<MySqlPool>,
) -> ApiResult<HttpResponse> {
    let username = body.username.trim();
    if username.is_empty() || body.password.is_empty() {
        return Err(ApiError::bad_request("Username and password must not be empty"));
    }

    let employee_id = match body.emp_id.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        Some(code) => {
            let id: u64 = sqlx::query_scalar("SELECT id FROM employees WHERE emp_id = ?")
                .bind(code)
                .fetch_optional(pool.get_ref())
                .await?
                .ok_or_else(|| ApiError::not_found(format!("No employee with code '{code}'")))?;

            let linked: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE employee_id = ?")
                .bind(id)
                .fetch_one(pool.get_ref())
                .await?;
            if linked > 0 {
                return Err(ApiError::conflict("Employee is already linked to an account"));
            }
            Some(id)
        }
        None => None,
    };

    let hashed = hash_password(&body.password)
        .map_err(|e| ApiError::Internal(format!("Failed to hash password: {e}")))?;

    let mut tx = pool.begin().await?;

    // Row lock on the admin role serialises concurrent first registrations
    sqlx::query("SELECT id FROM roles WHERE id = ? FOR UPDATE")
        .bind(Role::Admin.id())
        .execute(&mut *tx)
        .await?;

    // The very first account bootstraps the system as its admin
    let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(&mut *tx)
        .await?;
    let role = if existing == 0 { Role::Admin } else { Role::Employee };

    let result = sqlx::query(
        "INSERT INTO users (username, password, role_id, employee_id) VALUES (?, ?, ?, ?)",
    )
    .bind(username)
    .bind(&hashed)
    .bind(role.id())
    .bind(employee_id)
    .execute(&mut *tx)
    .await
    .map_err(register_error)?;

    tx.commit().await?;

    info!(user_id = result.last_insert_id(), role = %role, "Account registered");

    Ok(created(json!({
        "id": result.last_insert_id(),
        "username": username,
        "role": role,
        "employee_id": employee_id,
    })))
}

fn register_error(e: sqlx::Error) -> ApiError {
    if violates_key(&e, "uq_users_employee") {
        return ApiError::conflict("Employee is already linked to an account");
    }
    match ApiError::from(e) {
        ApiError::Conflict(_) => ApiError::conflict("Username already exists"),
        other => other,
    }
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginReqDto,
    responses(
        (status = 200, description = "Token pair", body = TokenPair),
        (status = 400, description = "Missing username or password"),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Account disabled")
    ),
    tag = "Auth"
)]
#[instrument(
    name = "auth_login",
    skip(pool, config, cache, user),
    fields(username = %user.username)
)]
pub async fn login(
    user: web::Json<LoginReqDto>,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    cache: web::Data<RoleCache>,
) -> ApiResult<HttpResponse> {
    info!("Login request received");

    if user.username.trim().is_empty() || user.password.is_empty() {
        info!("Validation failed: empty username or password");
        return Err(ApiError::bad_request("Username or password required"));
    }

    let db_user = sqlx::query_as::<_, UserCredentials>(
        r#"
        SELECT id, username, password, role_id, employee_id, is_active
        FROM users
        WHERE username = ?
        "#,
    )
    .bind(user.username.trim())
    .fetch_optional(pool.get_ref())
    .await?
    .ok_or_else(|| {
        info!("Invalid credentials: user not found");
        ApiError::unauthorized("Invalid credentials")
    })?;

    if let Err(e) = verify_password(&user.password, &db_user.password) {
        info!(error = %e, "Invalid credentials: password mismatch");
        return Err(ApiError::unauthorized("Invalid credentials"));
    }

    if !db_user.is_active {
        info!(user_id = db_user.id, "Login refused: account disabled");
        return Err(ApiError::forbidden("Account is disabled"));
    }

    let role = Role::from_id(db_user.role_id)
        .ok_or_else(|| ApiError::Internal(format!("Unknown role id {}", db_user.role_id)))?;

    let subject = TokenSubject {
        user_id: db_user.id,
        username: db_user.username.clone(),
        role: role.id(),
        employee_id: db_user.employee_id,
    };
    let tokens = issue_tokens(pool.get_ref(), &config, &subject).await?;

    // Non-fatal
    if let Err(e) = sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = ?")
        .bind(db_user.id)
        .execute(pool.get_ref())
        .await
    {
        error!(error = %e, "Failed to update last_login_at");
    }

    cache
        .insert(
            db_user.id,
            AccountState {
                role,
                is_active: db_user.is_active,
                employee_id: db_user.employee_id,
            },
        )
        .await;

    info!(user_id = db_user.id, "Login successful");

    Ok(ok(tokens))
}

#[utoipa::path(
    post,
    path = "/auth/refresh",
    responses(
        (status = 200, description = "Rotated token pair", body = TokenPair),
        (status = 401, description = "Missing, invalid or revoked refresh token"),
        (status = 403, description = "Account disabled")
    ),
    tag = "Auth",
    security(("bearer_auth" = []))
)]
#[instrument(name = "auth_refresh", skip_all)]
pub async fn refresh_token(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    cache: web::Data<RoleCache>,
) -> ApiResult<HttpResponse> {
    let token = bearer_token(&req).ok_or_else(|| ApiError::unauthorized("Missing refresh token"))?;

    let claims: Claims = verify_token(token, &config.jwt_secret)
        .map_err(|_| ApiError::unauthorized("Invalid or expired token"))?;

    if claims.token_type != TokenType::Refresh {
        return Err(ApiError::unauthorized("Refresh token required"));
    }

    let record: Option<(u64, u64, bool)> =
        sqlx::query_as("SELECT id, user_id, revoked FROM refresh_tokens WHERE jti = ?")
            .bind(&claims.jti)
            .fetch_optional(pool.get_ref())
            .await?;

    let (record_id, user_id) = match record {
        Some((id, user_id, false)) => (id, user_id),
        _ => return Err(ApiError::unauthorized("Refresh token revoked")),
    };

    sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE id = ?")
        .bind(record_id)
        .execute(pool.get_ref())
        .await?;

    // New tokens carry the account's current role, not the one in the old token
    cache.invalidate(user_id).await;
    let account = cache
        .resolve(pool.get_ref(), user_id)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Account no longer exists"))?;

    if !account.is_active {
        return Err(ApiError::forbidden("Account is disabled"));
    }

    let subject = TokenSubject {
        role: account.role.id(),
        employee_id: account.employee_id,
        ..TokenSubject::from(&claims)
    };
    let tokens = issue_tokens(pool.get_ref(), &config, &subject).await?;

    debug!(user_id, "Refresh token rotated");

    Ok(ok(tokens))
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    responses((status = 204, description = "Refresh token revoked (idempotent)")),
    tag = "Auth",
    security(("bearer_auth" = []))
)]
pub async fn logout(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> impl Responder {
    let Some(token) = bearer_token(&req) else {
        return HttpResponse::NoContent().finish();
    };

    let claims = match verify_token(token, &config.jwt_secret) {
        Ok(c) => c,
        Err(_) => return HttpResponse::NoContent().finish(),
    };

    // only refresh tokens can logout
    if claims.token_type != TokenType::Refresh {
        return HttpResponse::NoContent().finish();
    }

    if let Err(e) = sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE jti = ?")
        .bind(&claims.jti)
        .execute(pool.get_ref())
        .await
    {
        error!(error = %e, "Failed to revoke refresh token");
    }

    HttpResponse::NoContent().finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn bearer_prefix_is_required() {
        let req = TestRequest::default()
            .insert_header(("Authorization", "Bearer abc.def"))
            .to_http_request();
        assert_eq!(bearer_token(&req), Some("abc.def"));

        let req = TestRequest::default()
            .insert_header(("Authorization", "Basic abc"))
            .to_http_request();
        assert_eq!(bearer_token(&req), None);

        let req = TestRequest::default().to_http_request();
        assert_eq!(bearer_token(&req), None);
    }

    #[test]
    fn register_conflicts_name_the_taken_key() {
        use crate::db::testing::db_error;

        let err = register_error(db_error(1062, "Duplicate entry '12' for key 'users.uq_users_employee'"));
        assert_eq!(err.to_string(), "Employee is already linked to an account");

        let err = register_error(db_error(1062, "Duplicate entry 'asha' for key 'users.uq_users_username'"));
        assert_eq!(err.to_string(), "Username already exists");

        let err = register_error(db_error(1452, "Cannot add or update a child row"));
        assert!(matches!(err, ApiError::BadRequest(_)));
    }
}
