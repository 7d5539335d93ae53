use crate::auth::auth::AuthUser;
use crate::auth::jwt::verify_token;
use crate::config::Config;
use crate::models::TokenType;
use crate::utils::role_cache::RoleCache;
use actix_web::middleware::Next;
use actix_web::{
    Error, HttpMessage, HttpResponse,
    body::BoxBody,
    dev::{ServiceRequest, ServiceResponse},
    web::Data,
};
use serde_json::json;
use sqlx::MySqlPool;
use tracing::{debug, error};

fn reject(req: ServiceRequest, resp: HttpResponse) -> Result<ServiceResponse<BoxBody>, Error> {
    Ok(req.into_response(resp.map_into_boxed_body()))
}

pub async fn auth_middleware(
    req: ServiceRequest,
    next: Next<BoxBody>,
) -> Result<ServiceResponse<BoxBody>, Error> {
    let config = req
        .app_data::<Data<Config>>()
        .cloned()
        .ok_or_else(|| actix_web::error::ErrorInternalServerError("App config missing"))?;
    let cache = req
        .app_data::<Data<RoleCache>>()
        .cloned()
        .ok_or_else(|| actix_web::error::ErrorInternalServerError("Role cache missing"))?;
    let pool = req
        .app_data::<Data<MySqlPool>>()
        .cloned()
        .ok_or_else(|| actix_web::error::ErrorInternalServerError("Database pool missing"))?;

    let header_value = match req.headers().get("Authorization") {
        Some(h) => match h.to_str() {
            Ok(v) => v.to_string(),
            Err(_) => {
                let resp = HttpResponse::Unauthorized()
                    .json(json!({"error": "Invalid Authorization header encoding"}));
                return reject(req, resp);
            }
        },
        None => {
            let resp =
                HttpResponse::Unauthorized().json(json!({"error": "Missing Authorization header"}));
            return reject(req, resp);
        }
    };

    let token = match header_value.strip_prefix("Bearer ") {
        Some(t) => t,
        None => {
            let resp = HttpResponse::Unauthorized()
                .json(json!({"error": "Authorization header must start with Bearer"}));
            return reject(req, resp);
        }
    };

    let claims = match verify_token(token, &config.jwt_secret) {
        Ok(c) => c,
        Err(e) => {
            debug!(error = %e, "Token rejected");
            let resp = HttpResponse::Unauthorized().json(json!({"error": "Invalid or expired token"}));
            return reject(req, resp);
        }
    };

    if claims.token_type != TokenType::Access {
        let resp = HttpResponse::Unauthorized().json(json!({"error": "Access token required"}));
        return reject(req, resp);
    }

    // Role and active flag come from the account, so admin changes apply before the token expires
    let account = match cache.resolve(pool.get_ref(), claims.user_id).await {
        Ok(Some(account)) => account,
        Ok(None) => {
            let resp = HttpResponse::Unauthorized().json(json!({"error": "Account no longer exists"}));
            return reject(req, resp);
        }
        Err(e) => {
            error!(error = %e, user_id = claims.user_id, "Failed to resolve account");
            let resp = HttpResponse::InternalServerError().json(json!({"error": "Internal server error"}));
            return reject(req, resp);
        }
    };

    if !account.is_active {
        let resp = HttpResponse::Forbidden().json(json!({"error": "Account is disabled"}));
        return reject(req, resp);
    }

    let auth_user = AuthUser {
        user_id: claims.user_id,
        username: claims.sub,
        role: account.role,
        employee_id: account.employee_id,
    };

    req.extensions_mut().insert(auth_user);

    next.call(req).await
}
