use crate::attendance::{
    AttendanceLifecycle, AttendanceRepo, CheckOutcome, Clock, Evidence, EvidencePhase,
    EvidenceStore, FsEvidenceStore, MySqlLifecycle, StoreError,
};
use crate::auth::auth::AuthUser;
use actix_multipart::form::{MultipartForm, tempfile::TempFile, text::Text};
use actix_web::{HttpRequest, HttpResponse, Responder, web};
use chrono::{DateTime, Utc};
use serde_json::json;

#[derive(MultipartForm)]
pub struct CheckInForm {
    #[multipart(limit = "5MB")]
    pub check_in_photo: TempFile,
    pub check_in_location: Option<Text<String>>,
}

#[derive(MultipartForm)]
pub struct CheckOutForm {
    #[multipart(limit = "5MB")]
    pub check_out_photo: TempFile,
    pub check_out_location: Option<Text<String>>,
}

/// Photo must be a jpeg or png; returns the file extension to store under.
fn photo_extension(photo: &TempFile) -> Result<&'static str, HttpResponse> {
    match photo.content_type.as_ref().map(|m| m.essence_str()) {
        Some("image/jpeg") => Ok("jpg"),
        Some("image/png") => Ok("png"),
        _ => Err(HttpResponse::UnprocessableEntity().json(json!({
            "message": "Photo must be a jpeg or png image."
        }))),
    }
}

async fn persist_photo(
    evidence_store: &FsEvidenceStore,
    employee_id: u64,
    submitted_at: DateTime<Utc>,
    phase: EvidencePhase,
    photo: &TempFile,
) -> Result<Evidence, HttpResponse> {
    let extension = photo_extension(photo)?;
    let bytes = tokio::fs::read(photo.file.path()).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to read uploaded photo");
        HttpResponse::InternalServerError().json(json!({"message": "Internal Server Error"}))
    })?;

    let reference = evidence_store
        .store(
            employee_id,
            submitted_at.date_naive(),
            phase,
            submitted_at,
            extension,
            &bytes,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, employee_id, "Failed to store evidence photo");
            HttpResponse::InternalServerError().json(json!({"message": "Internal Server Error"}))
        })?;

    Ok(Evidence {
        reference,
        mime: photo
            .content_type
            .as_ref()
            .map(|m| m.essence_str().to_string()),
    })
}

fn store_error_response(e: StoreError, employee_id: u64) -> HttpResponse {
    match e {
        StoreError::Contention { .. } => {
            tracing::warn!(employee_id, "Attendance record contended past the wait bound");
            HttpResponse::Conflict().json(json!({
                "message": "Attendance record is busy, please retry."
            }))
        }
        StoreError::Database(e) => {
            tracing::error!(error = %e, employee_id, "Attendance persistence failed");
            HttpResponse::InternalServerError().json(json!({"message": "Internal Server Error"}))
        }
    }
}

async fn discard_evidence(evidence_store: &impl EvidenceStore, reference: &str) {
    if let Err(e) = evidence_store.discard(reference).await {
        tracing::warn!(error = %e, reference, "Failed to remove unreferenced evidence photo");
    }
}

/// Runs the check-in intent and keeps the evidence directory consistent with
/// the outcome: a photo whose submission was turned away never outlives the
/// response, so a rejected retry leaves no orphan file behind.
async fn apply_check_in<R: AttendanceRepo>(
    lifecycle: &AttendanceLifecycle<R>,
    evidence_store: &impl EvidenceStore,
    employee_id: u64,
    submitted_at: DateTime<Utc>,
    evidence: Evidence,
    location: Option<String>,
    ip: Option<String>,
) -> HttpResponse {
    let reference = evidence.reference.clone();

    match lifecycle
        .request_check_in(employee_id, submitted_at, evidence, location, ip)
        .await
    {
        Ok(CheckOutcome::Applied(record)) => HttpResponse::Created().json(json!({
            "message": "Check-in successful",
            "data": {
                "attendance": record,
            }
        })),
        Ok(CheckOutcome::Rejected(reason)) => {
            discard_evidence(evidence_store, &reference).await;
            HttpResponse::BadRequest().json(json!({
                "message": reason.message()
            }))
        }
        Err(e) => {
            discard_evidence(evidence_store, &reference).await;
            store_error_response(e, employee_id)
        }
    }
}

async fn apply_check_out<R: AttendanceRepo>(
    lifecycle: &AttendanceLifecycle<R>,
    evidence_store: &impl EvidenceStore,
    employee_id: u64,
    submitted_at: DateTime<Utc>,
    evidence: Evidence,
    location: Option<String>,
    ip: Option<String>,
) -> HttpResponse {
    let reference = evidence.reference.clone();

    match lifecycle
        .request_check_out(employee_id, submitted_at, evidence, location, ip)
        .await
    {
        Ok(CheckOutcome::Applied(record)) => {
            let worked_duration = record.worked_duration();
            HttpResponse::Ok().json(json!({
                "message": "Check-out successful",
                "data": {
                    "attendance": record,
                    "worked_duration": worked_duration,
                }
            }))
        }
        Ok(CheckOutcome::Rejected(reason)) => {
            discard_evidence(evidence_store, &reference).await;
            HttpResponse::BadRequest().json(json!({
                "message": reason.message()
            }))
        }
        Err(e) => {
            discard_evidence(evidence_store, &reference).await;
            store_error_response(e, employee_id)
        }
    }
}

/// Check-in endpoint
#[utoipa::path(
    post,
    path = "/api/v1/attendance/check-in",
    request_body(
        content = Object,
        description = "Multipart form: `check_in_photo` (required jpeg/png, max 5MB), `check_in_location` (optional string)",
        content_type = "multipart/form-data"
    ),
    responses(
        (status = 201, description = "Checked in successfully", body = Object, example = json!({
            "message": "Check-in successful"
        })),
        (status = 400, description = "Already checked in today", body = Object, example = json!({
            "message": "You have already checked in today."
        })),
        (status = 401, description = "Unauthorized"),
        (status = 409, description = "Record busy, retry"),
        (status = 422, description = "Photo missing or not an image"),
        (status = 500, description = "Internal server error")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn check_in(
    auth: AuthUser,
    req: HttpRequest,
    form: MultipartForm<CheckInForm>,
    lifecycle: web::Data<MySqlLifecycle>,
    evidence_store: web::Data<FsEvidenceStore>,
    clock: web::Data<dyn Clock>,
) -> actix_web::Result<impl Responder> {
    let employee_id = auth.user_id;
    let submitted_at = clock.now();
    let ip = req
        .connection_info()
        .realip_remote_addr()
        .map(str::to_string);

    let evidence = match persist_photo(
        &evidence_store,
        employee_id,
        submitted_at,
        EvidencePhase::CheckIn,
        &form.check_in_photo,
    )
    .await
    {
        Ok(e) => e,
        Err(resp) => return Ok(resp),
    };

    let location = form.check_in_location.as_ref().map(|t| t.0.clone());

    Ok(apply_check_in(
        lifecycle.get_ref(),
        evidence_store.get_ref(),
        employee_id,
        submitted_at,
        evidence,
        location,
        ip,
    )
    .await)
}

/// Check-out endpoint
#[utoipa::path(
    post,
    path = "/api/v1/attendance/check-out",
    request_body(
        content = Object,
        description = "Multipart form: `check_out_photo` (required jpeg/png, max 5MB), `check_out_location` (optional string)",
        content_type = "multipart/form-data"
    ),
    responses(
        (status = 200, description = "Checked out successfully", body = Object, example = json!({
            "message": "Check-out successful"
        })),
        (status = 400, description = "Not checked in, already checked out, or out-of-order timestamp"),
        (status = 401, description = "Unauthorized"),
        (status = 409, description = "Record busy, retry"),
        (status = 422, description = "Photo missing or not an image"),
        (status = 500, description = "Internal server error")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn check_out(
    auth: AuthUser,
    req: HttpRequest,
    form: MultipartForm<CheckOutForm>,
    lifecycle: web::Data<MySqlLifecycle>,
    evidence_store: web::Data<FsEvidenceStore>,
    clock: web::Data<dyn Clock>,
) -> actix_web::Result<impl Responder> {
    let employee_id = auth.user_id;
    let submitted_at = clock.now();
    let ip = req
        .connection_info()
        .realip_remote_addr()
        .map(str::to_string);

    let evidence = match persist_photo(
        &evidence_store,
        employee_id,
        submitted_at,
        EvidencePhase::CheckOut,
        &form.check_out_photo,
    )
    .await
    {
        Ok(e) => e,
        Err(resp) => return Ok(resp),
    };

    let location = form.check_out_location.as_ref().map(|t| t.0.clone());

    Ok(apply_check_out(
        lifecycle.get_ref(),
        evidence_store.get_ref(),
        employee_id,
        submitted_at,
        evidence,
        location,
        ip,
    )
    .await)
}

/// Attendance history for the logged-in employee
#[utoipa::path(
    get,
    path = "/api/v1/attendance/history",
    responses(
        (status = 200, description = "Attendance records, newest date first", body = Object, example = json!({
            "success": true,
            "data": []
        })),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal server error")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn history(
    auth: AuthUser,
    lifecycle: web::Data<MySqlLifecycle>,
) -> actix_web::Result<impl Responder> {
    let employee_id = auth.user_id;

    match lifecycle.history(employee_id).await {
        Ok(records) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": records,
        }))),
        Err(e) => Ok(store_error_response(e, employee_id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::testing::MemoryRepo;
    use crate::attendance::AttendanceStore;
    use actix_web::http::StatusCode;
    use chrono::TimeZone;
    use std::time::Duration;

    fn lifecycle() -> AttendanceLifecycle<MemoryRepo> {
        AttendanceLifecycle::new(AttendanceStore::new(
            MemoryRepo::default(),
            Duration::from_secs(2),
        ))
    }

    async fn stored_photo(
        store: &FsEvidenceStore,
        employee_id: u64,
        at: DateTime<Utc>,
        phase: EvidencePhase,
    ) -> Evidence {
        let reference = store
            .store(employee_id, at.date_naive(), phase, at, "jpg", b"selfie")
            .await
            .unwrap();
        Evidence {
            reference,
            mime: Some("image/jpeg".to_string()),
        }
    }

    #[tokio::test]
    async fn rejected_check_in_retry_leaves_no_photo_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsEvidenceStore::new(dir.path());
        let lc = lifecycle();

        let first_at = Utc.with_ymd_and_hms(2024, 1, 5, 9, 0, 0).unwrap();
        let first = stored_photo(&store, 1, first_at, EvidencePhase::CheckIn).await;
        let first_ref = first.reference.clone();
        let resp = apply_check_in(&lc, &store, 1, first_at, first, None, None).await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let retry_at = Utc.with_ymd_and_hms(2024, 1, 5, 9, 5, 0).unwrap();
        let retry = stored_photo(&store, 1, retry_at, EvidencePhase::CheckIn).await;
        let retry_ref = retry.reference.clone();
        let resp = apply_check_in(&lc, &store, 1, retry_at, retry, None, None).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        // The winner's photo stays; the rejected retry's photo is gone.
        assert!(dir.path().join(&first_ref).exists());
        assert!(!dir.path().join(&retry_ref).exists());
    }

    #[tokio::test]
    async fn rejected_check_out_photo_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsEvidenceStore::new(dir.path());
        let lc = lifecycle();

        // Check-out without a check-in is rejected.
        let at = Utc.with_ymd_and_hms(2024, 1, 5, 17, 0, 0).unwrap();
        let photo = stored_photo(&store, 1, at, EvidencePhase::CheckOut).await;
        let reference = photo.reference.clone();
        let resp = apply_check_out(&lc, &store, 1, at, photo, None, None).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        assert!(!dir.path().join(&reference).exists());
    }
}
