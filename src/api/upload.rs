use crate::{
    auth::auth::AuthUser,
    config::Config,
    error::{ApiError, ApiResult, created, ok},
    ingest::pipeline::{UploadRequest, run_upload},
    model::upload::{Upload, UploadKind, UploadLog, UploadedSheet},
    utils::{
        activity,
        db_utils::Filters,
        pagination::{Page, Pagination},
    },
};
use actix_multipart::{Field, Multipart};
use actix_web::{HttpResponse, web};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{MySql, MySqlPool, QueryBuilder};
use std::str::FromStr;
use tracing::{debug, info, instrument};
use utoipa::{IntoParams, ToSchema};

/// Cap for the small text parts of the form
const TEXT_FIELD_LIMIT: usize = 1024;

/// Raw multipart parts before validation.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub kind: Option<String>,
    pub format_name: Option<String>,
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
}

impl UploadForm {
    pub fn into_request(self, uploaded_by: u64) -> ApiResult<UploadRequest> {
        let raw_kind = self
            .kind
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ApiError::bad_request("kind is required"))?;

        let kind = UploadKind::from_str(raw_kind).map_err(|_| {
            ApiError::bad_request(format!(
                "Unknown kind '{raw_kind}'. Expected employee, supply_labour, subcontractor or format_template"
            ))
        })?;

        let file_name = self
            .file_name
            .filter(|f| !f.trim().is_empty())
            .ok_or_else(|| ApiError::bad_request("file is required"))?;

        if self.bytes.is_empty() {
            return Err(ApiError::bad_request("Uploaded file is empty"));
        }

        Ok(UploadRequest {
            kind,
            file_name,
            format_name: self.format_name,
            bytes: self.bytes,
            uploaded_by,
        })
    }
}

async fn read_field(field: &mut Field, limit: usize, too_large: impl Fn() -> ApiError) -> ApiResult<Vec<u8>> {
    let mut buf = Vec::new();
    while let Some(chunk) = field.next().await {
        let chunk = chunk?;
        if buf.len() + chunk.len() > limit {
            return Err(too_large());
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf)
}

async fn read_text(field: &mut Field, name: &str) -> ApiResult<String> {
    let bytes = read_field(field, TEXT_FIELD_LIMIT, || {
        ApiError::bad_request(format!("Field '{name}' is too long"))
    })
    .await?;
    String::from_utf8(bytes).map_err(|_| ApiError::bad_request(format!("Field '{name}' is not valid UTF-8")))
}

async fn read_form(mut payload: Multipart, max_bytes: usize) -> ApiResult<UploadForm> {
    let mut form = UploadForm::default();

    while let Some(item) = payload.next().await {
        let mut field = item?;
        let name = field
            .content_disposition()
            .and_then(|cd| cd.get_name().map(|n| n.to_string()));

        match name.as_deref() {
            Some("kind") => form.kind = Some(read_text(&mut field, "kind").await?),
            Some("format_name") => form.format_name = Some(read_text(&mut field, "format_name").await?),
            Some("file") => {
                form.file_name = field
                    .content_disposition()
                    .and_then(|cd| cd.get_filename().map(|f| f.to_string()));
                form.bytes = read_field(&mut field, max_bytes, || {
                    ApiError::PayloadTooLarge(format!("File exceeds the {max_bytes} byte upload limit"))
                })
                .await?;
            }
            other => {
                debug!(field = ?other, "Ignoring unknown multipart field");
                while let Some(chunk) = field.next().await {
                    chunk?;
                }
            }
        }
    }

    Ok(form)
}

/// Upload a workbook
///
/// Multipart form with `kind`, optional `format_name` and `file`.
#[utoipa::path(
    post,
    path = "/api/admin/uploads",
    request_body(content_type = "multipart/form-data", content = Object),
    responses(
        (status = 201, description = "Workbook merged", body = UploadSummary),
        (status = 400, description = "Missing field, unsupported file or unreadable workbook"),
        (status = 409, description = "Format already exists"),
        (status = 413, description = "File too large"),
        (status = 500, description = "Merge failed, upload marked failed")
    ),
    tag = "Upload",
    security(("bearer_auth" = []))
)]
#[instrument(name = "upload_workbook", skip(pool, config, payload, auth), fields(user_id = auth.user_id))]
pub async fn upload_workbook(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    payload: Multipart,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;

    let request = read_form(payload, config.upload_max_bytes)
        .await?
        .into_request(auth.user_id)?;

    info!(kind = %request.kind, file = %request.file_name, bytes = request.bytes.len(), "Upload received");

    let summary = run_upload(pool.get_ref(), request).await?;

    activity::record(
        pool.get_ref(),
        &auth,
        "upload",
        "upload",
        summary.upload_id,
        Some(format!(
            "{} {}: {} inserted, {} updated, {} skipped",
            summary.kind,
            summary.file_name,
            summary.counts.inserted,
            summary.counts.updated,
            summary.counts.skipped
        )),
    )
    .await;

    Ok(created(summary))
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UploadQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    /// `employee`, `supply_labour`, `subcontractor` or `format_template`
    pub kind: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/admin/uploads",
    params(UploadQuery),
    responses(
        (status = 200, description = "Paginated uploads, newest first", body = Object),
        (status = 400, description = "Unknown kind")
    ),
    tag = "Upload",
    security(("bearer_auth" = []))
)]
pub async fn list_uploads(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<UploadQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_view_access()?;

    let kind = match query.kind.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
        Some(raw) => Some(
            UploadKind::from_str(raw)
                .map_err(|_| ApiError::bad_request(format!("Unknown kind '{raw}'")))?,
        ),
        None => None,
    };

    let pagination = Pagination::new(query.page, query.per_page);
    let filters = Filters::default().eq("kind", kind.as_ref().map(|k| k.as_ref()));

    let mut count_qb = QueryBuilder::<MySql>::new("SELECT COUNT(*) FROM uploads");
    filters.push_where(&mut count_qb);
    let total: i64 = count_qb.build_query_scalar().fetch_one(pool.get_ref()).await?;

    let mut data_qb = QueryBuilder::<MySql>::new("SELECT * FROM uploads");
    filters.push_where(&mut data_qb);
    data_qb
        .push(" ORDER BY id DESC LIMIT ")
        .push_bind(pagination.limit())
        .push(" OFFSET ")
        .push_bind(pagination.offset());
    let uploads: Vec<Upload> = data_qb.build_query_as().fetch_all(pool.get_ref()).await?;

    Ok(ok(Page::new(uploads, pagination, total)))
}

#[derive(Serialize, ToSchema)]
pub struct UploadDetail {
    pub upload: Upload,
    pub logs: Vec<UploadLog>,
}

async fn fetch_upload(pool: &MySqlPool, id: u64) -> ApiResult<Upload> {
    sqlx::query_as::<_, Upload>("SELECT * FROM uploads WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Upload not found"))
}

#[utoipa::path(
    get,
    path = "/api/admin/uploads/{id}",
    params(("id", Path, description = "Upload ID")),
    responses(
        (status = 200, description = "Upload with its processing log", body = UploadDetail),
        (status = 404, description = "Upload not found")
    ),
    tag = "Upload",
    security(("bearer_auth" = []))
)]
pub async fn get_upload(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_view_access()?;
    let id = path.into_inner();

    let upload = fetch_upload(pool.get_ref(), id).await?;
    let logs = sqlx::query_as::<_, UploadLog>("SELECT * FROM upload_logs WHERE upload_id = ? ORDER BY id")
        .bind(id)
        .fetch_all(pool.get_ref())
        .await?;

    Ok(ok(UploadDetail { upload, logs }))
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SheetRowQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    /// Only rows from this worksheet
    pub sheet: Option<String>,
}

fn push_row_filter(qb: &mut QueryBuilder<'_, MySql>, upload_id: u64, sheet: Option<&str>) {
    qb.push(" WHERE upload_id = ").push_bind(upload_id);
    if let Some(sheet) = sheet.map(str::trim).filter(|s| !s.is_empty()) {
        qb.push(" AND sheet_name = ").push_bind(sheet.to_string());
    }
}

#[utoipa::path(
    get,
    path = "/api/admin/uploads/{id}/rows",
    params(("id", Path, description = "Upload ID"), SheetRowQuery),
    responses(
        (status = 200, description = "Paginated stored rows", body = Object),
        (status = 404, description = "Upload not found")
    ),
    tag = "Upload",
    security(("bearer_auth" = []))
)]
pub async fn list_upload_rows(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    query: web::Query<SheetRowQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_view_access()?;
    let id = path.into_inner();
    fetch_upload(pool.get_ref(), id).await?;

    let pagination = Pagination::new(query.page, query.per_page);

    let mut count_qb = QueryBuilder::<MySql>::new("SELECT COUNT(*) FROM uploaded_sheets");
    push_row_filter(&mut count_qb, id, query.sheet.as_deref());
    let total: i64 = count_qb.build_query_scalar().fetch_one(pool.get_ref()).await?;

    let mut data_qb = QueryBuilder::<MySql>::new("SELECT * FROM uploaded_sheets");
    push_row_filter(&mut data_qb, id, query.sheet.as_deref());
    data_qb
        .push(" ORDER BY sheet_name, row_index LIMIT ")
        .push_bind(pagination.limit())
        .push(" OFFSET ")
        .push_bind(pagination.offset());
    let rows: Vec<UploadedSheet> = data_qb.build_query_as().fetch_all(pool.get_ref()).await?;

    Ok(ok(Page::new(rows, pagination, total)))
}

#[utoipa::path(
    delete,
    path = "/api/admin/uploads/{id}",
    params(("id", Path, description = "Upload ID")),
    responses(
        (status = 200, description = "Upload, logs and stored rows deleted; merged records are kept"),
        (status = 404, description = "Upload not found")
    ),
    tag = "Upload",
    security(("bearer_auth" = []))
)]
#[instrument(name = "delete_upload", skip(pool, auth), fields(user_id = auth.user_id))]
pub async fn delete_upload(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;
    let id = path.into_inner();

    // logs and stored rows cascade
    let result = sqlx::query("DELETE FROM uploads WHERE id = ?")
        .bind(id)
        .execute(pool.get_ref())
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Upload not found"));
    }

    info!(id, "Upload deleted");
    activity::record(pool.get_ref(), &auth, "delete", "upload", id, None).await;

    Ok(ok(json!({ "id": id })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{ResponseError, http::StatusCode};

    fn form(kind: Option<&str>, file: Option<&str>, bytes: &[u8]) -> UploadForm {
        UploadForm {
            kind: kind.map(str::to_string),
            format_name: None,
            file_name: file.map(str::to_string),
            bytes: bytes.to_vec(),
        }
    }

    #[test]
    fn valid_form_becomes_request() {
        let request = form(Some(" supply_labour "), Some("march.xlsx"), b"PK")
            .into_request(5)
            .unwrap();
        assert_eq!(request.kind, UploadKind::SupplyLabour);
        assert_eq!(request.file_name, "march.xlsx");
        assert_eq!(request.uploaded_by, 5);
    }

    #[test]
    fn kind_is_required_and_checked() {
        let err = form(None, Some("a.xlsx"), b"PK").into_request(1).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let err = form(Some("payroll"), Some("a.xlsx"), b"PK").into_request(1).unwrap_err();
        assert!(err.to_string().contains("payroll"));
    }

    #[test]
    fn file_must_be_present_and_non_empty() {
        assert!(form(Some("employee"), None, b"PK").into_request(1).is_err());
        assert!(form(Some("employee"), Some("a.xlsx"), b"").into_request(1).is_err());
    }

    #[test]
    fn row_filter_adds_sheet_only_when_given() {
        let mut qb = QueryBuilder::<MySql>::new("SELECT COUNT(*) FROM uploaded_sheets");
        push_row_filter(&mut qb, 3, Some(" "));
        assert_eq!(qb.sql(), "SELECT COUNT(*) FROM uploaded_sheets WHERE upload_id = ?");

        let mut qb = QueryBuilder::<MySql>::new("SELECT COUNT(*) FROM uploaded_sheets");
        push_row_filter(&mut qb, 3, Some("March"));
        assert_eq!(
            qb.sql(),
            "SELECT COUNT(*) FROM uploaded_sheets WHERE upload_id = ? AND sheet_name = ?"
        );
    }
}
