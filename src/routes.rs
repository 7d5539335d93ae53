use crate::{
    api::{activity, employee, format, profile, report, subcontractor, supply_labour, upload, user},
    auth::{handlers, middleware::auth_middleware},
    config::Config,
    error::ApiError,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use anyhow::{Result, anyhow};
use std::sync::Arc;

type Limiter = Arc<Governor<PeerIpKeyExtractor, NoOpMiddleware>>;

/// Per-IP limiters, built once so every worker shares the same buckets.
#[derive(Clone)]
pub struct RateLimiters {
    login: Limiter,
    register: Limiter,
    refresh: Limiter,
    protected: Limiter,
}

fn build_limiter(requests_per_min: u32) -> Result<Limiter> {
    let per_ms = 60_000 / u64::from(requests_per_min.max(1));
    let cfg = GovernorConfigBuilder::default()
        .milliseconds_per_request(per_ms.max(1))
        .burst_size(requests_per_min.max(1))
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .ok_or_else(|| anyhow!("invalid rate limit: {requests_per_min}/min"))?;
    Ok(Arc::new(Governor::new(&cfg)))
}

impl RateLimiters {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            login: build_limiter(config.rate_login_per_min)?,
            register: build_limiter(config.rate_register_per_min)?,
            refresh: build_limiter(config.rate_refresh_per_min)?,
            protected: build_limiter(config.rate_protected_per_min)?,
        })
    }
}

/// Malformed JSON, query strings and path segments answer `400 {"error": ...}`.
pub fn extractor_configs(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _| ApiError::bad_request(err.to_string()).into()),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|err, _| ApiError::bad_request(err.to_string()).into()),
    )
    .app_data(
        web::PathConfig::default()
            .error_handler(|err, _| ApiError::bad_request(err.to_string()).into()),
    );
}

pub fn configure(cfg: &mut web::ServiceConfig, config: &Config, limiters: &RateLimiters) {
    // Public routes
    cfg.service(
        web::scope("/auth")
            .service(
                web::resource("/login")
                    .wrap(limiters.login.clone())
                    .route(web::post().to(handlers::login)),
            )
            .service(
                web::resource("/register")
                    .wrap(limiters.register.clone())
                    .route(web::post().to(handlers::register)),
            )
            .service(
                web::resource("/refresh")
                    .wrap(limiters.refresh.clone())
                    .route(web::post().to(handlers::refresh_token)),
            )
            .service(
                web::resource("/logout")
                    .wrap(limiters.login.clone())
                    .route(web::post().to(handlers::logout)),
            ),
    );

    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware)) // authentication
            .wrap(limiters.protected.clone()) // rate limiting
            .route("/me", web::get().to(user::me))
            .service(admin_scope())
            .service(employee_scope()),
    );
}

fn admin_scope() -> actix_web::Scope {
    web::scope("/admin")
        // /admin/employees
        .service(
            web::resource("/employees")
                .route(web::get().to(employee::list_employees))
                .route(web::post().to(employee::create_employee)),
        )
        // before /{id} so "stats" is not read as an id
        .service(web::resource("/employees/stats").route(web::get().to(employee::employee_stats)))
        .service(
            web::resource("/employees/{id}")
                .route(web::get().to(employee::get_employee))
                .route(web::put().to(employee::update_employee))
                .route(web::delete().to(employee::delete_employee)),
        )
        .service(web::resource("/projects").route(web::get().to(employee::list_projects)))
        // /admin/subcontractors
        .service(
            web::resource("/subcontractors")
                .route(web::get().to(subcontractor::list_subcontractors))
                .route(web::post().to(subcontractor::create_subcontractor)),
        )
        .service(
            web::resource("/subcontractors/{id}")
                .route(web::get().to(subcontractor::get_subcontractor))
                .route(web::put().to(subcontractor::update_subcontractor))
                .route(web::delete().to(subcontractor::delete_subcontractor)),
        )
        // /admin/supply-labour
        .service(
            web::resource("/supply-labour")
                .route(web::get().to(supply_labour::list_supply_labour))
                .route(web::post().to(supply_labour::create_supply_labour)),
        )
        .service(
            web::resource("/supply-labour/{id}")
                .route(web::get().to(supply_labour::get_supply_labour))
                .route(web::put().to(supply_labour::update_supply_labour))
                .route(web::delete().to(supply_labour::delete_supply_labour)),
        )
        // /admin/uploads
        .service(
            web::resource("/uploads")
                .route(web::get().to(upload::list_uploads))
                .route(web::post().to(upload::upload_workbook)),
        )
        .service(
            web::resource("/uploads/{id}")
                .route(web::get().to(upload::get_upload))
                .route(web::delete().to(upload::delete_upload)),
        )
        .service(web::resource("/uploads/{id}/rows").route(web::get().to(upload::list_upload_rows)))
        // /admin/formats
        .service(web::resource("/formats").route(web::get().to(format::list_formats)))
        .service(
            web::resource("/formats/{format_id}/rows").route(web::get().to(format::list_format_rows)),
        )
        .service(
            web::resource("/formats/{format_id}/picks/{row_index}")
                .route(web::delete().to(format::release_pick)),
        )
        // /admin/users
        .service(web::resource("/users").route(web::get().to(user::list_users)))
        .service(web::resource("/users/{id}/role").route(web::put().to(user::set_role)))
        .service(web::resource("/users/{id}/active").route(web::put().to(user::set_active)))
        .service(web::resource("/activity").route(web::get().to(activity::list_activity)))
        // /admin/reports
        .service(web::resource("/reports/summary").route(web::get().to(report::summary)))
        .service(web::resource("/reports/master-excel").route(web::get().to(report::master_excel)))
}

fn employee_scope() -> actix_web::Scope {
    web::scope("/employee")
        .service(web::resource("/profile").route(web::get().to(profile::my_profile)))
        .service(web::resource("/formats").route(web::get().to(format::employee_formats)))
        .service(web::resource("/formats/{format_id}/pick").route(web::post().to(format::pick_row)))
        .service(web::resource("/picks").route(web::get().to(format::my_picks)))
}

// LOGIN
//  ├─ access_token (15 min)
//  └─ refresh_token (7 days)

// API REQUEST
//  └─ Authorization: Bearer access_token
//       └─ role + active flag re-read through the role cache

// ACCESS EXPIRED
//  └─ POST /auth/refresh with refresh_token
//       └─ returns a new pair, old refresh token revoked

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_rate_still_builds() {
        assert!(build_limiter(0).is_ok());
        assert!(build_limiter(120_000).is_ok());
    }
}
