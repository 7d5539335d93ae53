use crate::api::employee::{CreateEmployee, EmployeeStats};
use crate::api::format::{EmployeeFormat, FormatRowView, FormatSummary, PickRequest, PickedRow};
use crate::api::report::DashboardSummary;
use crate::api::subcontractor::CreateSubcontractor;
use crate::api::supply_labour::CreateSupplyLabour;
use crate::api::upload::UploadDetail;
use crate::api::user::{Me, SetActive, SetRole};
use crate::ingest::pipeline::{MergeCounts, UploadSummary};
use crate::model::activity::ActivityLog;
use crate::model::employee::{Employee, RecordStatus};
use crate::model::role::Role;
use crate::model::subcontractor::Subcontractor;
use crate::model::supply_labour::SupplyLabour;
use crate::model::upload::{Upload, UploadKind, UploadLog, UploadStatus, UploadedSheet};
use crate::model::user::User;
use crate::models::{LoginReqDto, RegisterReq, TokenPair};
use utoipa::Modify;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Workforce API",
        version = "1.0.0",
        description = r#"
## Workforce Records & Spreadsheet Ingestion

Backend for keeping **employee**, **supply labour** and **subcontractor** records in sync with the spreadsheets HR already maintains.

### 🔹 Key Features
- **Uploads**
  - Excel workbooks (`.xlsx`, `.xlsm`, `.xls`, `.ods`) merged into records, every row kept for audit
- **Template formats**
  - Upload a format once, employees each pick one row
- **Records**
  - List, filter, edit and delete employees, supply labour and subcontractors
- **Reports**
  - Dashboard counts and a master Excel export, optionally per project

### 🔐 Security
Endpoints under `/api` need a **JWT Bearer** access token.
`admin` may change data, `viewer` may read the admin views, `employee` accounts use the self-service routes.

### 📦 Response Format
- Success: `{"success": true, "data": ...}`
- Failure: `{"error": "..."}`
"#,
    ),
    paths(
        crate::auth::handlers::register,
        crate::auth::handlers::login,
        crate::auth::handlers::refresh_token,
        crate::auth::handlers::logout,

        crate::api::user::me,
        crate::api::user::list_users,
        crate::api::user::set_role,
        crate::api::user::set_active,

        crate::api::employee::list_employees,
        crate::api::employee::create_employee,
        crate::api::employee::employee_stats,
        crate::api::employee::get_employee,
        crate::api::employee::update_employee,
        crate::api::employee::delete_employee,
        crate::api::employee::list_projects,

        crate::api::subcontractor::list_subcontractors,
        crate::api::subcontractor::create_subcontractor,
        crate::api::subcontractor::get_subcontractor,
        crate::api::subcontractor::update_subcontractor,
        crate::api::subcontractor::delete_subcontractor,

        crate::api::supply_labour::list_supply_labour,
        crate::api::supply_labour::create_supply_labour,
        crate::api::supply_labour::get_supply_labour,
        crate::api::supply_labour::update_supply_labour,
        crate::api::supply_labour::delete_supply_labour,

        crate::api::upload::upload_workbook,
        crate::api::upload::list_uploads,
        crate::api::upload::get_upload,
        crate::api::upload::list_upload_rows,
        crate::api::upload::delete_upload,

        crate::api::format::list_formats,
        crate::api::format::list_format_rows,
        crate::api::format::release_pick,
        crate::api::format::employee_formats,
        crate::api::format::pick_row,
        crate::api::format::my_picks,

        crate::api::profile::my_profile,
        crate::api::activity::list_activity,
        crate::api::report::summary,
        crate::api::report::master_excel
    ),
    components(
        schemas(
            RegisterReq,
            LoginReqDto,
            TokenPair,
            Role,
            Me,
            User,
            SetRole,
            SetActive,
            RecordStatus,
            Employee,
            CreateEmployee,
            EmployeeStats,
            Subcontractor,
            CreateSubcontractor,
            SupplyLabour,
            CreateSupplyLabour,
            UploadKind,
            UploadStatus,
            Upload,
            UploadLog,
            UploadedSheet,
            UploadDetail,
            UploadSummary,
            MergeCounts,
            FormatSummary,
            FormatRowView,
            EmployeeFormat,
            PickedRow,
            PickRequest,
            ActivityLog,
            DashboardSummary
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Registration, login and token rotation"),
        (name = "User", description = "Accounts and roles"),
        (name = "Employee", description = "Employee records"),
        (name = "Subcontractor", description = "Subcontractor companies"),
        (name = "Supply Labour", description = "Labour supplied by third parties"),
        (name = "Upload", description = "Spreadsheet ingestion"),
        (name = "Format", description = "Template formats and picks"),
        (name = "Employee Self-Service", description = "Routes for employee accounts"),
        (name = "Activity", description = "Audit trail"),
        (name = "Report", description = "Dashboards and exports"),
    )
)]
pub struct ApiDoc;

pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_routes_and_bearer_scheme() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/admin/uploads"));
        assert!(doc.paths.paths.contains_key("/api/employee/formats/{format_id}/pick"));

        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}
