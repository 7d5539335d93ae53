use crate::{
    auth::auth::AuthUser,
    error::{ApiResult, ok},
    excel::writer::{
        MasterReport, PickReportRow, XLSX_CONTENT_TYPE, build_master_workbook, master_report_filename,
    },
    model::{employee::Employee, subcontractor::Subcontractor, supply_labour::SupplyLabour},
};
use actix_web::{HttpResponse, http::header, web};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{MySql, MySqlPool, QueryBuilder};
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Serialize, ToSchema, sqlx::FromRow)]
pub struct DashboardSummary {
    pub employees_total: i64,
    pub employees_active: i64,
    pub employees_inactive: i64,
    pub supply_labour_total: i64,
    pub subcontractors_total: i64,
    pub uploads_total: i64,
    pub uploads_failed: i64,
    pub formats_total: i64,
    pub template_rows_total: i64,
    pub template_rows_picked: i64,
}

#[utoipa::path(
    get,
    path = "/api/admin/reports/summary",
    responses((status = 200, description = "Dashboard counts", body = DashboardSummary)),
    tag = "Report",
    security(("bearer_auth" = []))
)]
pub async fn summary(auth: AuthUser, pool: web::Data<MySqlPool>) -> ApiResult<HttpResponse> {
    auth.require_view_access()?;

    let summary = sqlx::query_as::<_, DashboardSummary>(
        r#"
        SELECT
            (SELECT COUNT(*) FROM employees) AS employees_total,
            (SELECT COUNT(*) FROM employees WHERE status = 'active') AS employees_active,
            (SELECT COUNT(*) FROM employees WHERE status = 'inactive') AS employees_inactive,
            (SELECT COUNT(*) FROM supply_labours) AS supply_labour_total,
            (SELECT COUNT(*) FROM subcontractors) AS subcontractors_total,
            (SELECT COUNT(*) FROM uploads) AS uploads_total,
            (SELECT COUNT(*) FROM uploads WHERE status = 'failed') AS uploads_failed,
            (SELECT COUNT(DISTINCT format_id) FROM format_template_data) AS formats_total,
            (SELECT COUNT(*) FROM format_template_data) AS template_rows_total,
            (SELECT COUNT(*) FROM picked_template_rows) AS template_rows_picked
        "#,
    )
    .fetch_one(pool.get_ref())
    .await?;

    Ok(ok(summary))
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct MasterExcelQuery {
    /// Restrict every sheet to one project
    pub project: Option<String>,
}

fn project_clause<'a>(qb: &mut QueryBuilder<'a, MySql>, column: &str, project: Option<&str>) {
    if let Some(project) = project {
        qb.push(" WHERE ").push(column).push(" = ").push_bind(project.to_string());
    }
}

async fn load_master_report(pool: &MySqlPool, project: Option<String>) -> ApiResult<MasterReport> {
    let filter = project.as_deref();

    let mut qb = QueryBuilder::<MySql>::new("SELECT * FROM employees");
    project_clause(&mut qb, "project_name", filter);
    qb.push(" ORDER BY emp_id");
    let employees: Vec<Employee> = qb.build_query_as().fetch_all(pool).await?;

    let mut qb = QueryBuilder::<MySql>::new("SELECT * FROM supply_labours");
    project_clause(&mut qb, "project_name", filter);
    qb.push(" ORDER BY company_name, emp_id");
    let supply_labour: Vec<SupplyLabour> = qb.build_query_as().fetch_all(pool).await?;

    let mut qb = QueryBuilder::<MySql>::new("SELECT * FROM subcontractors");
    project_clause(&mut qb, "project_name", filter);
    qb.push(" ORDER BY company_name");
    let subcontractors: Vec<Subcontractor> = qb.build_query_as().fetch_all(pool).await?;

    let mut qb = QueryBuilder::<MySql>::new(
        r#"
        SELECT p.format_id, f.format_name, p.row_index, e.emp_id, e.name AS employee_name,
               e.project_name, p.picked_at
        FROM picked_template_rows p
        JOIN format_template_data f ON f.format_id = p.format_id AND f.row_index = p.row_index
        JOIN employees e ON e.id = p.employee_id
        "#,
    );
    project_clause(&mut qb, "e.project_name", filter);
    qb.push(" ORDER BY p.format_id, p.row_index");
    let picks: Vec<PickReportRow> = qb.build_query_as().fetch_all(pool).await?;

    Ok(MasterReport {
        generated_at: Utc::now(),
        project,
        employees,
        supply_labour,
        subcontractors,
        picks,
    })
}

/// Download the master workbook
#[utoipa::path(
    get,
    path = "/api/admin/reports/master-excel",
    params(MasterExcelQuery),
    responses(
        (status = 200, description = "Master report workbook",
            content_type = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet")
    ),
    tag = "Report",
    security(("bearer_auth" = []))
)]
#[instrument(name = "master_excel", skip(pool, query, auth), fields(user_id = auth.user_id))]
pub async fn master_excel(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<MasterExcelQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_view_access()?;

    let project = query
        .into_inner()
        .project
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty());

    let report = load_master_report(pool.get_ref(), project).await?;
    let filename = master_report_filename(report.project.as_deref(), report.generated_at);

    let (rows, bytes) = web::block(move || {
        let rows = report.employees.len() + report.supply_labour.len() + report.subcontractors.len();
        build_master_workbook(&report).map(|bytes| (rows, bytes))
    })
    .await??;

    info!(file = %filename, rows, size = bytes.len(), "Master report generated");

    Ok(HttpResponse::Ok()
        .content_type(XLSX_CONTENT_TYPE)
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        ))
        .body(bytes))
}
