//! Upload pipeline: workbook -> stored sheet rows -> merged records

use actix_web::web;
use serde::Serialize;
use sqlx::types::Json;
use sqlx::{MySql, MySqlConnection, MySqlPool, QueryBuilder};
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;

use crate::error::{ApiError, ApiResult};
use crate::excel::reader::{ParsedSheet, SheetRow, has_supported_extension, read_workbook};
use crate::ingest::mapping::{
    EmployeeRecord, MappingError, SubcontractorRecord, SupplyLabourRecord, slugify,
};
use crate::model::upload::{LogLevel, UploadKind, UploadStatus};

/// Rows per multi-row INSERT
const BATCH_SIZE: usize = 500;

#[derive(Debug)]
pub struct UploadRequest {
    pub kind: UploadKind,
    pub file_name: String,
    pub format_name: Option<String>,
    pub bytes: Vec<u8>,
    pub uploaded_by: u64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct MergeCounts {
    pub inserted: u32,
    pub updated: u32,
    pub skipped: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Merge {
    Inserted,
    Updated,
}

impl MergeCounts {
    fn record(&mut self, merge: Merge) {
        match merge {
            Merge::Inserted => self.inserted += 1,
            Merge::Updated => self.updated += 1,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UploadSummary {
    pub upload_id: u64,
    pub kind: UploadKind,
    pub file_name: String,
    pub format_id: Option<String>,
    pub status: UploadStatus,
    pub sheet_count: u32,
    pub row_count: u32,
    pub counts: MergeCounts,
}

/// Target of a `format_template` upload
#[derive(Debug, Clone, PartialEq)]
pub struct FormatTarget {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
struct PendingLog {
    level: LogLevel,
    sheet_name: Option<String>,
    row_index: Option<i32>,
    message: String,
}

impl PendingLog {
    fn info(message: String) -> Self {
        Self {
            level: LogLevel::Info,
            sheet_name: None,
            row_index: None,
            message,
        }
    }

    fn skipped(sheet: &ParsedSheet, row: &SheetRow, err: &MappingError) -> Self {
        Self {
            level: LogLevel::Warn,
            sheet_name: Some(sheet.name.clone()),
            row_index: Some(row.index as i32),
            message: format!("Row skipped: {}", err),
        }
    }
}

/// `format_template_data.format_name`, `uploads.format_id` and `uploads.file_name` widths.
const FORMAT_NAME_LEN: usize = 255;
const FORMAT_ID_LEN: usize = 128;
const FILE_NAME_LEN: usize = 255;

/// Strip any client-side directory from the multipart filename.
pub fn base_file_name(raw: &str) -> String {
    raw.rsplit(['/', '\\']).next().unwrap_or(raw).trim().to_string()
}

pub fn format_target(format_name: Option<&str>) -> ApiResult<FormatTarget> {
    let name = format_name
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ApiError::bad_request("format_name is required for format_template uploads"))?;

    if name.chars().count() > FORMAT_NAME_LEN {
        return Err(ApiError::bad_request(format!(
            "format_name must be at most {FORMAT_NAME_LEN} characters"
        )));
    }

    let id = slugify(name);
    if id.is_empty() {
        return Err(ApiError::bad_request("format_name must contain letters or digits"));
    }
    if id.len() > FORMAT_ID_LEN {
        return Err(ApiError::bad_request(format!(
            "format_name is too long once slugged ({} of {FORMAT_ID_LEN} characters)",
            id.len()
        )));
    }

    Ok(FormatTarget {
        id,
        name: name.to_string(),
    })
}

fn check_file_name(file_name: &str) -> ApiResult<()> {
    if file_name.chars().count() > FILE_NAME_LEN {
        return Err(ApiError::bad_request(format!(
            "File name must be at most {FILE_NAME_LEN} characters"
        )));
    }
    Ok(())
}

fn summary_message(kind: UploadKind, row_count: usize, counts: &MergeCounts) -> String {
    format!(
        "{} upload processed {} rows: {} inserted, {} updated, {} skipped",
        kind, row_count, counts.inserted, counts.updated, counts.skipped
    )
}

#[instrument(
    name = "upload_pipeline",
    skip(pool, request),
    fields(kind = %request.kind, file = %request.file_name, uploaded_by = request.uploaded_by)
)]
pub async fn run_upload(pool: &MySqlPool, request: UploadRequest) -> ApiResult<UploadSummary> {
    let file_name = base_file_name(&request.file_name);
    if !has_supported_extension(&file_name) {
        return Err(ApiError::bad_request(
            "Unsupported file type. Allowed: .xlsx, .xlsm, .xls, .ods",
        ));
    }
    check_file_name(&file_name)?;

    let format = match request.kind {
        UploadKind::FormatTemplate => {
            let target = format_target(request.format_name.as_deref())?;
            let existing: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM format_template_data WHERE format_id = ?")
                    .bind(&target.id)
                    .fetch_one(pool)
                    .await?;
            if existing > 0 {
                return Err(ApiError::conflict(format!(
                    "Format '{}' already exists",
                    target.id
                )));
            }
            Some(target)
        }
        _ => None,
    };

    let bytes = request.bytes;
    let sheets = web::block(move || read_workbook(bytes))
        .await?
        .map_err(|e| ApiError::bad_request(format!("{e:#}")))?;

    let row_count: usize = sheets.iter().map(|s| s.rows.len()).sum();
    if row_count == 0 {
        return Err(ApiError::bad_request("Workbook has no data rows"));
    }

    let upload_id = sqlx::query(
        r#"
        INSERT INTO uploads (file_name, kind, format_id, uploaded_by, status, sheet_count, row_count)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&file_name)
    .bind(request.kind.as_ref())
    .bind(format.as_ref().map(|f| f.id.clone()))
    .bind(request.uploaded_by)
    .bind(UploadStatus::Processing.as_ref())
    .bind(sheets.len() as i32)
    .bind(row_count as i32)
    .execute(pool)
    .await?
    .last_insert_id();

    let mut tx = pool.begin().await?;
    let merged = merge_upload(&mut tx, upload_id, request.kind, format.as_ref(), &sheets).await;

    let counts = match merged {
        Ok(counts) => {
            if let Err(e) = tx.commit().await {
                mark_failed(pool, upload_id, &e).await;
                return Err(e.into());
            }
            counts
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback().await {
                error!(error = %rollback_err, upload_id, "Rollback failed");
            }
            mark_failed(pool, upload_id, &e).await;
            return Err(e.into());
        }
    };

    info!(
        upload_id,
        inserted = counts.inserted,
        updated = counts.updated,
        skipped = counts.skipped,
        "Upload completed"
    );

    Ok(UploadSummary {
        upload_id,
        kind: request.kind,
        file_name,
        format_id: format.map(|f| f.id),
        status: UploadStatus::Completed,
        sheet_count: sheets.len() as u32,
        row_count: row_count as u32,
        counts,
    })
}

async fn merge_upload(
    conn: &mut MySqlConnection,
    upload_id: u64,
    kind: UploadKind,
    format: Option<&FormatTarget>,
    sheets: &[ParsedSheet],
) -> Result<MergeCounts, sqlx::Error> {
    store_sheet_rows(conn, upload_id, sheets).await?;

    let mut counts = MergeCounts::default();
    let mut logs = Vec::new();

    match (kind, format) {
        (UploadKind::Employee, _) => {
            merge_employees(conn, upload_id, sheets, &mut counts, &mut logs).await?
        }
        (UploadKind::SupplyLabour, _) => {
            merge_supply_labour(conn, upload_id, sheets, &mut counts, &mut logs).await?
        }
        (UploadKind::Subcontractor, _) => {
            merge_subcontractors(conn, upload_id, sheets, &mut counts, &mut logs).await?
        }
        (UploadKind::FormatTemplate, Some(format)) => {
            counts.inserted = insert_template_rows(conn, upload_id, format, sheets).await?;
        }
        (UploadKind::FormatTemplate, None) => {
            return Err(sqlx::Error::Protocol("format template upload without a format".into()));
        }
    }

    let row_count = sheets.iter().map(|s| s.rows.len()).sum();
    logs.push(PendingLog::info(summary_message(kind, row_count, &counts)));
    insert_logs(conn, upload_id, &logs).await?;

    sqlx::query(
        r#"
        UPDATE uploads
        SET status = ?, inserted_count = ?, updated_count = ?, skipped_count = ?
        WHERE id = ?
        "#,
    )
    .bind(UploadStatus::Completed.as_ref())
    .bind(counts.inserted)
    .bind(counts.updated)
    .bind(counts.skipped)
    .bind(upload_id)
    .execute(&mut *conn)
    .await?;

    Ok(counts)
}

async fn store_sheet_rows(
    conn: &mut MySqlConnection,
    upload_id: u64,
    sheets: &[ParsedSheet],
) -> Result<(), sqlx::Error> {
    let rows: Vec<(&str, &SheetRow)> = sheets
        .iter()
        .flat_map(|sheet| sheet.rows.iter().map(move |row| (sheet.name.as_str(), row)))
        .collect();

    for chunk in rows.chunks(BATCH_SIZE) {
        let mut qb = QueryBuilder::<MySql>::new(
            "INSERT INTO uploaded_sheets (upload_id, sheet_name, row_index, data) ",
        );
        qb.push_values(chunk, |mut b, (sheet_name, row)| {
            b.push_bind(upload_id)
                .push_bind(sheet_name.to_string())
                .push_bind(row.index as i32)
                .push_bind(Json(row.to_json()));
        });
        qb.build().execute(&mut *conn).await?;
    }

    Ok(())
}

async fn insert_template_rows(
    conn: &mut MySqlConnection,
    upload_id: u64,
    format: &FormatTarget,
    sheets: &[ParsedSheet],
) -> Result<u32, sqlx::Error> {
    // row_index runs across sheets so every template row of the format has a distinct index
    let rows: Vec<(usize, &SheetRow)> = sheets
        .iter()
        .flat_map(|sheet| sheet.rows.iter())
        .enumerate()
        .collect();

    for chunk in rows.chunks(BATCH_SIZE) {
        let mut qb = QueryBuilder::<MySql>::new(
            "INSERT INTO format_template_data (format_id, format_name, row_index, data, upload_id) ",
        );
        qb.push_values(chunk, |mut b, (index, row)| {
            b.push_bind(format.id.clone())
                .push_bind(format.name.clone())
                .push_bind(*index as i32)
                .push_bind(Json(row.to_json()))
                .push_bind(upload_id);
        });
        qb.build().execute(&mut *conn).await?;
    }

    Ok(rows.len() as u32)
}

async fn insert_logs(
    conn: &mut MySqlConnection,
    upload_id: u64,
    logs: &[PendingLog],
) -> Result<(), sqlx::Error> {
    for chunk in logs.chunks(BATCH_SIZE) {
        let mut qb = QueryBuilder::<MySql>::new(
            "INSERT INTO upload_logs (upload_id, level, sheet_name, row_index, message) ",
        );
        qb.push_values(chunk, |mut b, log| {
            b.push_bind(upload_id)
                .push_bind(log.level.as_ref().to_string())
                .push_bind(log.sheet_name.clone())
                .push_bind(log.row_index)
                .push_bind(log.message.clone());
        });
        qb.build().execute(&mut *conn).await?;
    }
    Ok(())
}

/// Best effort: the upload row lives outside the rolled-back transaction.
async fn mark_failed(pool: &MySqlPool, upload_id: u64, cause: &sqlx::Error) {
    error!(error = %cause, upload_id, "Upload failed");

    if let Err(e) = sqlx::query("UPDATE uploads SET status = ? WHERE id = ?")
        .bind(UploadStatus::Failed.as_ref())
        .bind(upload_id)
        .execute(pool)
        .await
    {
        error!(error = %e, upload_id, "Failed to mark upload as failed");
    }

    if let Err(e) = sqlx::query("INSERT INTO upload_logs (upload_id, level, message) VALUES (?, ?, ?)")
        .bind(upload_id)
        .bind(LogLevel::Error.as_ref())
        .bind(format!("Upload failed: {}", cause))
        .execute(pool)
        .await
    {
        error!(error = %e, upload_id, "Failed to write upload failure log");
    }
}

async fn merge_employees(
    conn: &mut MySqlConnection,
    upload_id: u64,
    sheets: &[ParsedSheet],
    counts: &mut MergeCounts,
    logs: &mut Vec<PendingLog>,
) -> Result<(), sqlx::Error> {
    for sheet in sheets {
        for row in &sheet.rows {
            match EmployeeRecord::from_row(row) {
                Ok(record) => counts.record(upsert_employee(conn, upload_id, &record).await?),
                Err(e) => {
                    warn!(sheet = %sheet.name, row = row.index, error = %e, "Employee row skipped");
                    counts.skipped += 1;
                    logs.push(PendingLog::skipped(sheet, row, &e));
                }
            }
        }
    }
    Ok(())
}

async fn upsert_employee(
    conn: &mut MySqlConnection,
    upload_id: u64,
    r: &EmployeeRecord,
) -> Result<Merge, sqlx::Error> {
    let existing: Option<u64> = sqlx::query_scalar("SELECT id FROM employees WHERE emp_id = ?")
        .bind(&r.emp_id)
        .fetch_optional(&mut *conn)
        .await?;

    match existing {
        Some(id) => {
            sqlx::query(
                r#"
                UPDATE employees
                SET name = ?,
                    father_name = COALESCE(?, father_name),
                    designation = COALESCE(?, designation),
                    department = COALESCE(?, department),
                    project_name = COALESCE(?, project_name),
                    site = COALESCE(?, site),
                    phone = COALESCE(?, phone),
                    email = COALESCE(?, email),
                    joining_date = COALESCE(?, joining_date),
                    status = COALESCE(?, status)
                WHERE id = ?
                "#,
            )
            .bind(&r.name)
            .bind(&r.father_name)
            .bind(&r.designation)
            .bind(&r.department)
            .bind(&r.project_name)
            .bind(&r.site)
            .bind(&r.phone)
            .bind(&r.email)
            .bind(r.joining_date)
            .bind(r.status.map(|s| s.to_string()))
            .bind(id)
            .execute(&mut *conn)
            .await?;
            Ok(Merge::Updated)
        }
        None => {
            sqlx::query(
                r#"
                INSERT INTO employees
                (emp_id, name, father_name, designation, department, project_name, site, phone, email, joining_date, status, upload_id)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&r.emp_id)
            .bind(&r.name)
            .bind(&r.father_name)
            .bind(&r.designation)
            .bind(&r.department)
            .bind(&r.project_name)
            .bind(&r.site)
            .bind(&r.phone)
            .bind(&r.email)
            .bind(r.joining_date)
            .bind(r.status.unwrap_or_default().to_string())
            .bind(upload_id)
            .execute(&mut *conn)
            .await?;
            Ok(Merge::Inserted)
        }
    }
}

async fn merge_supply_labour(
    conn: &mut MySqlConnection,
    upload_id: u64,
    sheets: &[ParsedSheet],
    counts: &mut MergeCounts,
    logs: &mut Vec<PendingLog>,
) -> Result<(), sqlx::Error> {
    for sheet in sheets {
        for row in &sheet.rows {
            match SupplyLabourRecord::from_row(row) {
                Ok(record) => counts.record(upsert_supply_labour(conn, upload_id, &record).await?),
                Err(e) => {
                    warn!(sheet = %sheet.name, row = row.index, error = %e, "Supply labour row skipped");
                    counts.skipped += 1;
                    logs.push(PendingLog::skipped(sheet, row, &e));
                }
            }
        }
    }
    Ok(())
}

async fn upsert_supply_labour(
    conn: &mut MySqlConnection,
    upload_id: u64,
    r: &SupplyLabourRecord,
) -> Result<Merge, sqlx::Error> {
    let existing: Option<u64> =
        sqlx::query_scalar("SELECT id FROM supply_labours WHERE emp_id = ? AND company_name = ?")
            .bind(&r.emp_id)
            .bind(&r.company_name)
            .fetch_optional(&mut *conn)
            .await?;

    match existing {
        Some(id) => {
            sqlx::query(
                r#"
                UPDATE supply_labours
                SET name = ?,
                    designation = COALESCE(?, designation),
                    project_name = COALESCE(?, project_name),
                    phone = COALESCE(?, phone),
                    joining_date = COALESCE(?, joining_date),
                    status = COALESCE(?, status)
                WHERE id = ?
                "#,
            )
            .bind(&r.name)
            .bind(&r.designation)
            .bind(&r.project_name)
            .bind(&r.phone)
            .bind(r.joining_date)
            .bind(r.status.map(|s| s.to_string()))
            .bind(id)
            .execute(&mut *conn)
            .await?;
            Ok(Merge::Updated)
        }
        None => {
            sqlx::query(
                r#"
                INSERT INTO supply_labours
                (emp_id, name, company_name, designation, project_name, phone, joining_date, status, upload_id)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&r.emp_id)
            .bind(&r.name)
            .bind(&r.company_name)
            .bind(&r.designation)
            .bind(&r.project_name)
            .bind(&r.phone)
            .bind(r.joining_date)
            .bind(r.status.unwrap_or_default().to_string())
            .bind(upload_id)
            .execute(&mut *conn)
            .await?;
            Ok(Merge::Inserted)
        }
    }
}

async fn merge_subcontractors(
    conn: &mut MySqlConnection,
    upload_id: u64,
    sheets: &[ParsedSheet],
    counts: &mut MergeCounts,
    logs: &mut Vec<PendingLog>,
) -> Result<(), sqlx::Error> {
    for sheet in sheets {
        for row in &sheet.rows {
            match SubcontractorRecord::from_row(row) {
                Ok(record) => counts.record(upsert_subcontractor(conn, upload_id, &record).await?),
                Err(e) => {
                    warn!(sheet = %sheet.name, row = row.index, error = %e, "Subcontractor row skipped");
                    counts.skipped += 1;
                    logs.push(PendingLog::skipped(sheet, row, &e));
                }
            }
        }
    }
    Ok(())
}

async fn upsert_subcontractor(
    conn: &mut MySqlConnection,
    upload_id: u64,
    r: &SubcontractorRecord,
) -> Result<Merge, sqlx::Error> {
    let existing: Option<u64> = sqlx::query_scalar("SELECT id FROM subcontractors WHERE company_name = ?")
        .bind(&r.company_name)
        .fetch_optional(&mut *conn)
        .await?;

    match existing {
        Some(id) => {
            sqlx::query(
                r#"
                UPDATE subcontractors
                SET contact_person = COALESCE(?, contact_person),
                    phone = COALESCE(?, phone),
                    email = COALESCE(?, email),
                    project_name = COALESCE(?, project_name),
                    work_type = COALESCE(?, work_type),
                    labour_count = COALESCE(?, labour_count),
                    status = COALESCE(?, status)
                WHERE id = ?
                "#,
            )
            .bind(&r.contact_person)
            .bind(&r.phone)
            .bind(&r.email)
            .bind(&r.project_name)
            .bind(&r.work_type)
            .bind(r.labour_count)
            .bind(r.status.map(|s| s.to_string()))
            .bind(id)
            .execute(&mut *conn)
            .await?;
            Ok(Merge::Updated)
        }
        None => {
            sqlx::query(
                r#"
                INSERT INTO subcontractors
                (company_name, contact_person, phone, email, project_name, work_type, labour_count, status, upload_id)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&r.company_name)
            .bind(&r.contact_person)
            .bind(&r.phone)
            .bind(&r.email)
            .bind(&r.project_name)
            .bind(&r.work_type)
            .bind(r.labour_count.unwrap_or(0))
            .bind(r.status.unwrap_or_default().to_string())
            .bind(upload_id)
            .execute(&mut *conn)
            .await?;
            Ok(Merge::Inserted)
        }
    }
}
