use crate::error::ApiError;
use crate::model::role::Role;
use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload};
use futures::future::{Ready, ready};

/// Authenticated caller, placed in request extensions by `auth_middleware`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: u64,
    pub username: String,
    /// Current role, read through the role cache rather than trusted from the token
    pub role: Role,

    /// Present only if this user is linked to an employee record
    pub employee_id: Option<u64>,
}

impl FromRequest for AuthUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<AuthUser>()
                .cloned()
                .ok_or_else(|| ApiError::unauthorized("Authentication required")),
        )
    }
}

impl AuthUser {
    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.role == Role::Admin {
            Ok(())
        } else {
            Err(ApiError::forbidden("Admin access required"))
        }
    }

    /// Admins and viewers.
    pub fn require_view_access(&self) -> Result<(), ApiError> {
        if self.role.can_view() {
            Ok(())
        } else {
            Err(ApiError::forbidden("Admin or viewer access required"))
        }
    }

    /// Returns the linked employee record id for employee accounts.
    pub fn require_employee(&self) -> Result<u64, ApiError> {
        if self.role != Role::Employee {
            return Err(ApiError::forbidden("Employee access required"));
        }
        self.employee_id
            .ok_or_else(|| ApiError::forbidden("Account is not linked to an employee record"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{ResponseError, http::StatusCode, test::TestRequest};

    fn user(role: Role, employee_id: Option<u64>) -> AuthUser {
        AuthUser {
            user_id: 7,
            username: "jdoe".to_string(),
            role,
            employee_id,
        }
    }

    #[test]
    fn admin_guard() {
        assert!(user(Role::Admin, None).require_admin().is_ok());
        let err = user(Role::Viewer, None).require_admin().unwrap_err();
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn view_guard() {
        assert!(user(Role::Admin, None).require_view_access().is_ok());
        assert!(user(Role::Viewer, None).require_view_access().is_ok());
        assert!(user(Role::Employee, Some(1)).require_view_access().is_err());
    }

    #[test]
    fn employee_guard_needs_a_linked_record() {
        assert_eq!(user(Role::Employee, Some(42)).require_employee().unwrap(), 42);
        assert!(user(Role::Employee, None).require_employee().is_err());
        assert!(user(Role::Admin, Some(42)).require_employee().is_err());
    }

    #[actix_web::test]
    async fn extracted_from_extensions() {
        let req = TestRequest::default().to_http_request();
        let missing = AuthUser::extract(&req).await.unwrap_err();
        assert_eq!(missing.status_code(), StatusCode::UNAUTHORIZED);

        req.extensions_mut().insert(user(Role::Viewer, None));
        let found = AuthUser::extract(&req).await.unwrap();
        assert_eq!(found.role, Role::Viewer);
        assert_eq!(found.username, "jdoe");
    }
}
