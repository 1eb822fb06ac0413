use crate::attendance::{Clock, FsEvidenceStore};
use crate::auth::auth::AuthUser;
use actix_multipart::form::{MultipartForm, tempfile::TempFile, text::Text};
use actix_web::{HttpResponse, Responder, web};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{MySqlPool, prelude::FromRow};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, PartialEq, Eq)]
pub enum LeaveType {
    Annual,
    Sick,
    Unpaid,
}

impl LeaveType {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "annual" => Some(LeaveType::Annual),
            "sick" => Some(LeaveType::Sick),
            "unpaid" => Some(LeaveType::Unpaid),
            _ => None,
        }
    }

    fn as_str(&self) -> &str {
        match self {
            LeaveType::Annual => "annual",
            LeaveType::Sick => "sick",
            LeaveType::Unpaid => "unpaid",
        }
    }
}

#[derive(MultipartForm)]
pub struct CreateLeaveForm {
    pub start_date: Text<String>,
    pub end_date: Text<String>,
    pub leave_type: Text<String>,
    /// Counted working days; half days allowed.
    pub days: Text<f64>,
    pub reason: Option<Text<String>>,
    /// Optional supporting document (medical letter and the like).
    #[multipart(limit = "5MB")]
    pub attachment: Option<TempFile>,
}

fn attachment_extension(file: &TempFile) -> Option<&'static str> {
    match file.content_type.as_ref().map(|m| m.essence_str()) {
        Some("image/jpeg") => Some("jpg"),
        Some("image/png") => Some("png"),
        Some("application/pdf") => Some("pdf"),
        _ => None,
    }
}

#[derive(Serialize, ToSchema)]
pub struct LeaveListResponse {
    pub data: Vec<LeaveResponse>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 10)]
    pub per_page: u32,
    #[schema(example = 1)]
    pub total: i64,
}

#[derive(Deserialize, IntoParams, ToSchema)]
pub struct LeaveFilter {
    #[schema(example = 123)]
    /// Filter by user ID (HR/Admin only)
    pub user_id: Option<u64>,
    #[schema(example = "pending")]
    /// Filter by leave status
    pub status: Option<String>,
    #[schema(example = 1)]
    /// Pagination page number (start with 1)
    pub page: Option<u64>,
    #[schema(example = 10)]
    /// Pagination per page number
    pub per_page: Option<u64>,
}

// Helper enum for typed SQLx binding
enum FilterValue<'a> {
    U64(u64),
    Str(&'a str),
}

#[derive(Serialize, Deserialize, FromRow, ToSchema)]
pub struct LeaveResponse {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = 1000)]
    pub user_id: u64,
    #[schema(example = "2026-01-01", format = "date", value_type = String)]
    pub start_date: chrono::NaiveDate,
    #[schema(example = "2026-01-03", format = "date", value_type = String)]
    pub end_date: chrono::NaiveDate,
    #[schema(example = "sick", value_type = String)]
    pub leave_type: String,
    #[schema(example = 2.5)]
    pub days: f64,
    pub reason: Option<String>,
    pub attachment_path: Option<String>,
    #[schema(example = "pending", value_type = String)]
    pub status: Option<String>,
    #[schema(example = "2026-01-01T00:00:00Z", format = "date-time", value_type = Option<String>)]
    pub requested_at: Option<DateTime<Utc>>,
    pub processed_by: Option<u64>,
    #[schema(format = "date-time", value_type = Option<String>)]
    pub processed_at: Option<DateTime<Utc>>,
}

const LEAVE_COLUMNS: &str = "id, user_id, start_date, end_date, leave_type, days, reason, \
     attachment_path, status, requested_at, processed_by, processed_at";

/* =========================
Create leave request
========================= */
/// Swagger doc for create_leave endpoint
#[utoipa::path(
    post,
    path = "/api/v1/leave",
    request_body(
        content = Object,
        description = "Multipart form: `start_date`/`end_date` (YYYY-MM-DD), `leave_type` \
            (annual|sick|unpaid), `days` (>= 0.5), `reason` (optional), `attachment` \
            (optional jpeg/png/pdf, max 5MB)",
        content_type = "multipart/form-data"
    ),
    responses(
        (status = 201, description = "Leave request submitted successfully",
         body = Object,
         example = json!({
            "message": "Leave request submitted",
            "status": "pending"
         })
        ),
        (status = 400, description = "Bad request"),
        (status = 401, description = "Unauthorized"),
        (status = 422, description = "Attachment is not a supported document type")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn create_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    clock: web::Data<dyn Clock>,
    evidence_store: web::Data<FsEvidenceStore>,
    form: MultipartForm<CreateLeaveForm>,
) -> actix_web::Result<impl Responder> {
    let Ok(start_date) = NaiveDate::parse_from_str(&form.start_date, "%Y-%m-%d") else {
        return Ok(HttpResponse::BadRequest().json(serde_json::json!({
            "message": "start_date must be a YYYY-MM-DD date"
        })));
    };
    let Ok(end_date) = NaiveDate::parse_from_str(&form.end_date, "%Y-%m-%d") else {
        return Ok(HttpResponse::BadRequest().json(serde_json::json!({
            "message": "end_date must be a YYYY-MM-DD date"
        })));
    };
    let Some(leave_type) = LeaveType::parse(&form.leave_type) else {
        return Ok(HttpResponse::BadRequest().json(serde_json::json!({
            "message": "leave_type must be one of annual, sick, unpaid"
        })));
    };

    if start_date > end_date {
        return Ok(HttpResponse::BadRequest().json(serde_json::json!({
            "message": "start_date cannot be after end_date"
        })));
    }

    let days = form.days.0;
    if days < 0.5 {
        return Ok(HttpResponse::BadRequest().json(serde_json::json!({
            "message": "days must be at least 0.5"
        })));
    }

    let attachment_path = match &form.attachment {
        Some(file) => {
            let Some(extension) = attachment_extension(file) else {
                return Ok(HttpResponse::UnprocessableEntity().json(serde_json::json!({
                    "message": "Attachment must be a jpeg, png or pdf."
                })));
            };
            let bytes = tokio::fs::read(file.file.path()).await.map_err(|e| {
                tracing::error!(error = %e, "Failed to read leave attachment");
                actix_web::error::ErrorInternalServerError("Internal Server Error")
            })?;
            let reference = evidence_store
                .store_leave_attachment(auth.user_id, clock.now(), extension, &bytes)
                .await
                .map_err(|e| {
                    tracing::error!(error = %e, user_id = auth.user_id, "Failed to store leave attachment");
                    actix_web::error::ErrorInternalServerError("Internal Server Error")
                })?;
            Some(reference)
        }
        None => None,
    };

    let reason = form.reason.as_ref().map(|t| t.0.clone());

    sqlx::query(
        r#"
        INSERT INTO leave_requests
            (user_id, start_date, end_date, leave_type, days, reason, attachment_path, status, requested_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, 'pending', NOW())
        "#,
    )
    .bind(auth.user_id)
    .bind(start_date)
    .bind(end_date)
    .bind(leave_type.as_str())
    .bind(days)
    .bind(&reason)
    .bind(&attachment_path)
    .execute(pool.get_ref())
    .await
    .map_err(|e| {
        tracing::error!(error = %e, user_id = auth.user_id, "Failed to create leave request");
        actix_web::error::ErrorInternalServerError("Internal Server Error")
    })?;

    Ok(HttpResponse::Created().json(serde_json::json!({
        "message": "Leave request submitted",
        "status": "pending"
    })))
}

/// Mark a pending leave request approved or rejected, recording who
/// processed it and when. Shared by both decision endpoints.
async fn process_leave(
    auth: AuthUser,
    pool: &MySqlPool,
    leave_id: u64,
    decision: &str,
) -> actix_web::Result<HttpResponse> {
    auth.require_leave_processor()?;

    let result = sqlx::query(
        r#"
        UPDATE leave_requests
        SET status = ?, processed_by = ?, processed_at = NOW()
        WHERE id = ?
        AND status = 'pending'
        "#,
    )
    .bind(decision)
    .bind(auth.user_id)
    .bind(leave_id)
    .execute(pool)
    .await
    .map_err(|e| {
        tracing::error!(error = %e, leave_id, decision, "Leave decision failed");
        actix_web::error::ErrorInternalServerError("Internal Server Error")
    })?;

    if result.rows_affected() == 0 {
        return Ok(HttpResponse::BadRequest().json(serde_json::json!({
            "message": "Leave request not found or already processed"
        })));
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": format!("Leave {decision}")
    })))
}

/* =========================
Approve leave (HR/Admin)
========================= */
/// Swagger doc for approve_leave endpoint
#[utoipa::path(
    put,
    path = "/api/v1/leave/{leave_id}/approve",
    params(
        ("leave_id" = u64, Path, description = "ID of the leave request to approve")
    ),
    responses(
        (status = 200, description = "Leave approved successfully", body = Object, example = json!({
            "message": "Leave approved"
        })),
        (status = 400, description = "Leave request not found or already processed"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn approve_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    process_leave(auth, pool.get_ref(), path.into_inner(), "approved").await
}

/* =========================
Reject leave (HR/Admin)
========================= */
/// Swagger doc for reject_leave endpoint
#[utoipa::path(
    put,
    path = "/api/v1/leave/{leave_id}/reject",
    params(
        ("leave_id" = u64, Path, description = "ID of the leave request to reject")
    ),
    responses(
        (status = 200, description = "Leave rejected successfully", body = Object, example = json!({
            "message": "Leave rejected"
        })),
        (status = 400, description = "Leave request not found or already processed"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn reject_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    process_leave(auth, pool.get_ref(), path.into_inner(), "rejected").await
}

/// for getting a leave application details endpoint
#[utoipa::path(
    get,
    path = "/api/v1/leave/{leave_id}",
    params(
        ("leave_id" = u64, Path, description = "ID of the leave request to fetch")
    ),
    responses(
        (status = 200, description = "Leave request found", body = LeaveResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Leave request not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn get_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let leave_id = path.into_inner();

    let sql = format!("SELECT {LEAVE_COLUMNS} FROM leave_requests WHERE id = ?");
    let leave = sqlx::query_as::<_, LeaveResponse>(&sql)
        .bind(leave_id)
        .fetch_optional(pool.get_ref())
        .await
        .map_err(|e| {
            tracing::error!(error = %e, leave_id, "Failed to fetch leave request");
            actix_web::error::ErrorInternalServerError("Internal Server Error")
        })?;

    match leave {
        // Employees may only see their own requests.
        Some(data) if auth.role.can_process_leave() || data.user_id == auth.user_id => {
            Ok(HttpResponse::Ok().json(data))
        }
        Some(_) => Ok(HttpResponse::Forbidden().json(serde_json::json!({
            "message": "Not your leave request"
        }))),
        None => Ok(HttpResponse::NotFound().json(serde_json::json!({
            "message": "Leave request not found"
        }))),
    }
}

/// for getting leave applications endpoint
#[utoipa::path(
    get,
    path = "/api/v1/leave",
    params(LeaveFilter),
    responses(
        (status = 200, description = "Paginated leave list", body = LeaveListResponse),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn leave_list(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<LeaveFilter>,
) -> actix_web::Result<impl Responder> {
    // -------------------------
    // Pagination
    // -------------------------
    let per_page = query.per_page.unwrap_or(10).min(100);
    let page = query.page.unwrap_or(1).max(1);
    let offset = (page - 1) * per_page;

    // -------------------------
    // WHERE clause
    // -------------------------
    let mut where_sql = String::from(" WHERE 1=1");
    let mut args: Vec<FilterValue> = Vec::new();

    if auth.role.can_process_leave() {
        if let Some(user_id) = query.user_id {
            where_sql.push_str(" AND user_id = ?");
            args.push(FilterValue::U64(user_id));
        }
    } else {
        // Employees are pinned to their own requests regardless of filter.
        where_sql.push_str(" AND user_id = ?");
        args.push(FilterValue::U64(auth.user_id));
    }

    if let Some(status) = query.status.as_deref() {
        where_sql.push_str(" AND status = ?");
        args.push(FilterValue::Str(status));
    }

    // -------------------------
    // COUNT query
    // -------------------------
    let count_sql = format!("SELECT COUNT(*) FROM leave_requests{}", where_sql);

    let mut count_q = sqlx::query_scalar::<_, i64>(&count_sql);
    for arg in &args {
        count_q = match arg {
            FilterValue::U64(v) => count_q.bind(*v),
            FilterValue::Str(s) => count_q.bind(*s),
        };
    }

    let total = count_q.fetch_one(pool.get_ref()).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to count leave requests");
        actix_web::error::ErrorInternalServerError("Internal Server Error")
    })?;

    // -------------------------
    // DATA query
    // -------------------------
    let data_sql = format!(
        r#"
        SELECT {LEAVE_COLUMNS}
        FROM leave_requests
        {}
        ORDER BY requested_at DESC
        LIMIT ? OFFSET ?
        "#,
        where_sql
    );

    let mut data_q = sqlx::query_as::<_, LeaveResponse>(&data_sql);
    for arg in args {
        data_q = match arg {
            FilterValue::U64(v) => data_q.bind(v),
            FilterValue::Str(s) => data_q.bind(s),
        };
    }

    let leaves = data_q
        .bind(per_page)
        .bind(offset)
        .fetch_all(pool.get_ref())
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to fetch leave list");
            actix_web::error::ErrorInternalServerError("Internal Server Error")
        })?;

    let response = LeaveListResponse {
        data: leaves,
        page: page as u32,
        per_page: per_page as u32,
        total,
    };

    Ok(HttpResponse::Ok().json(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leave_type_parses_known_values_only() {
        assert_eq!(LeaveType::parse("annual"), Some(LeaveType::Annual));
        assert_eq!(LeaveType::parse("sick"), Some(LeaveType::Sick));
        assert_eq!(LeaveType::parse("unpaid"), Some(LeaveType::Unpaid));
        assert_eq!(LeaveType::parse("holiday"), None);
        assert_eq!(LeaveType::parse("Sick"), None);
    }
}
