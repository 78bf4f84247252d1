// src/routes/assistance_routes.rs
//
// Patient assistance requests and the withdrawal side of the funding
// ledger. Donation confirmation lives in donation_routes.rs.

use axum::{
    extract::{Path, Query, State},
    routing::{get, patch, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::Row;
use uuid::Uuid;

use crate::{
    error::ApiError,
    funding,
    middleware::auth_context::AuthContext,
    models::{
        resolve_patient_id_by_user_id, ApiOk, AppState, AssistanceRow, AssistanceStatus,
        UrgencyLevel, WithdrawalRow,
    },
    notify::notify_best_effort,
};

// roles: 0 patient, 1 doctor, 2 admin, 3 charity_admin

fn is_patient(auth: &AuthContext) -> bool {
    auth.role == 0
}

fn is_funding_staff(auth: &AuthContext) -> bool {
    auth.role == 2 || auth.role == 3
}

fn ensure_funding_staff(auth: &AuthContext) -> Result<(), ApiError> {
    if is_funding_staff(auth) {
        Ok(())
    } else {
        Err(ApiError::forbidden(
            "Only admin/charity_admin can manage assistance requests",
        ))
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/assistance", get(list_assistance).post(create_assistance))
        .route("/assistance/{assistance_id}", get(get_assistance))
        .route("/assistance/{assistance_id}/status", patch(update_status))
        .route("/assistance/{assistance_id}/withdraw", post(withdraw))
        .route("/assistance/{assistance_id}/withdrawals", get(list_withdrawals))
}

/* ============================================================
   Status progression
   ============================================================ */

fn allowed_targets(current: AssistanceStatus) -> &'static [AssistanceStatus] {
    use AssistanceStatus::*;
    match current {
        Pending => &[Approved, Rejected],
        Approved => &[InProgress],
        InProgress => &[Completed],
        // terminal
        Completed | Rejected => &[],
    }
}

/// Progression is forward-only; nothing ever returns to pending.
fn validate_assistance_transition(
    current: AssistanceStatus,
    target: AssistanceStatus,
) -> Result<(), ApiError> {
    if !allowed_targets(current).contains(&target) {
        return Err(ApiError::illegal_transition(format!(
            "cannot move assistance request from {current:?} to {target:?}"
        )));
    }
    Ok(())
}

fn validate_support_window(start: NaiveDate, end: NaiveDate) -> Result<(), ApiError> {
    if start > end {
        return Err(ApiError::validation(
            "support_start_date must be on or before support_end_date",
        ));
    }
    Ok(())
}

/* ============================================================
   Shared lookups
   ============================================================ */

const ASSISTANCE_COLUMNS: &str = r#"
    assistance_id, patient_id, request_type, title, description,
    medical_condition, requested_amount, urgency, raised_amount,
    withdrawn_amount, remaining_amount, status, approved_by,
    support_start_date, support_end_date, created_at, updated_at
"#;

async fn fetch_assistance(
    db: &sqlx::PgPool,
    assistance_id: Uuid,
) -> Result<AssistanceRow, ApiError> {
    sqlx::query_as::<_, AssistanceRow>(&format!(
        r#"
        SELECT {ASSISTANCE_COLUMNS}
        FROM assistance_request
        WHERE assistance_id = $1
        "#
    ))
    .bind(assistance_id)
    .fetch_optional(db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(|| ApiError::not_found("assistance request"))
}

async fn owner_user_id(db: &sqlx::PgPool, patient_id: Uuid) -> Option<Uuid> {
    let row = sqlx::query(r#"SELECT user_id FROM patient WHERE patient_id = $1"#)
        .bind(patient_id)
        .fetch_optional(db)
        .await
        .ok()??;
    row.try_get("user_id").ok()
}

/* ============================================================
   POST /assistance
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct AttachmentUpload {
    // path/size/filename as returned by the file-storage service
    pub path: String,
    pub size: i64,
    pub filename: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateAssistanceRequest {
    pub request_type: String,
    pub title: String,
    pub description: String,
    pub medical_condition: String,
    pub requested_amount: i64,
    pub urgency: String,
    pub support_start_date: String, // YYYY-MM-DD
    pub support_end_date: String,   // YYYY-MM-DD
    pub attachments: Option<Vec<AttachmentUpload>>,
}

pub async fn create_assistance(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateAssistanceRequest>,
) -> Result<Json<ApiOk<AssistanceRow>>, ApiError> {
    if !is_patient(&auth) {
        return Err(ApiError::forbidden(
            "Only patients can create assistance requests",
        ));
    }

    for (field, value) in [
        ("request_type", &req.request_type),
        ("title", &req.title),
        ("description", &req.description),
        ("medical_condition", &req.medical_condition),
    ] {
        if value.trim().is_empty() {
            return Err(ApiError::validation(format!("{field} is required")));
        }
    }

    funding::validate_requested_amount(req.requested_amount)?;

    let urgency = UrgencyLevel::from_str_name(req.urgency.trim())
        .ok_or_else(|| ApiError::validation("unknown urgency"))?;

    let start = NaiveDate::parse_from_str(req.support_start_date.trim(), "%Y-%m-%d")
        .map_err(|_| ApiError::validation("support_start_date must be YYYY-MM-DD"))?;
    let end = NaiveDate::parse_from_str(req.support_end_date.trim(), "%Y-%m-%d")
        .map_err(|_| ApiError::validation("support_end_date must be YYYY-MM-DD"))?;
    validate_support_window(start, end)?;

    let patient_id = resolve_patient_id_by_user_id(&state.db, auth.user_id).await?;

    let mut tx = state.db.begin().await.map_err(ApiError::db)?;

    let row = sqlx::query_as::<_, AssistanceRow>(&format!(
        r#"
        INSERT INTO assistance_request (
            patient_id, request_type, title, description, medical_condition,
            requested_amount, urgency, raised_amount, withdrawn_amount,
            remaining_amount, status, support_start_date, support_end_date
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, 0, 0, $8, 0, $9, $10)
        RETURNING {ASSISTANCE_COLUMNS}
        "#
    ))
    .bind(patient_id)
    .bind(req.request_type.trim())
    .bind(req.title.trim())
    .bind(req.description.trim())
    .bind(req.medical_condition.trim())
    .bind(req.requested_amount)
    .bind(urgency)
    .bind(funding::remaining_amount(req.requested_amount, 0))
    .bind(start)
    .bind(end)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| ApiError::BadRequest("ASSISTANCE_CREATE_FAILED", format!("{e}")))?;

    if let Some(attachments) = &req.attachments {
        for a in attachments {
            sqlx::query(
                r#"
                INSERT INTO assistance_attachment (assistance_id, path, size_bytes, filename)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(row.assistance_id)
            .bind(&a.path)
            .bind(a.size)
            .bind(&a.filename)
            .execute(&mut *tx)
            .await
            .map_err(|e| ApiError::BadRequest("ATTACHMENT_CREATE_FAILED", format!("{e}")))?;
        }
    }

    tx.commit().await.map_err(ApiError::db)?;

    Ok(Json(ApiOk::new(row)))
}

/* ============================================================
   GET /assistance + GET /assistance/{id}
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
}

pub async fn list_assistance(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(q): Query<ListQuery>,
) -> Result<Json<ApiOk<Vec<AssistanceRow>>>, ApiError> {
    let status = match q.status.as_deref() {
        Some(s) => Some(
            AssistanceStatus::from_str_name(s)
                .ok_or_else(|| ApiError::invalid_status("unknown status filter"))?,
        ),
        None => None,
    };

    let patient_filter = if is_patient(&auth) {
        Some(resolve_patient_id_by_user_id(&state.db, auth.user_id).await?)
    } else if is_funding_staff(&auth) {
        None
    } else {
        return Err(ApiError::forbidden(
            "You do not have permission to view assistance requests",
        ));
    };

    let rows = sqlx::query_as::<_, AssistanceRow>(&format!(
        r#"
        SELECT {ASSISTANCE_COLUMNS}
        FROM assistance_request
        WHERE ($1::uuid IS NULL OR patient_id = $1)
          AND ($2::smallint IS NULL OR status = $2)
        ORDER BY created_at DESC
        "#
    ))
    .bind(patient_filter)
    .bind(status)
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(ApiOk::new(rows)))
}

async fn ensure_view_scope(
    state: &AppState,
    auth: &AuthContext,
    row: &AssistanceRow,
) -> Result<(), ApiError> {
    if is_funding_staff(auth) {
        return Ok(());
    }
    if is_patient(auth) {
        let pid = resolve_patient_id_by_user_id(&state.db, auth.user_id).await?;
        if pid == row.patient_id {
            return Ok(());
        }
    }
    Err(ApiError::forbidden(
        "You may only view your own assistance requests",
    ))
}

pub async fn get_assistance(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(assistance_id): Path<Uuid>,
) -> Result<Json<ApiOk<AssistanceRow>>, ApiError> {
    let row = fetch_assistance(&state.db, assistance_id).await?;
    ensure_view_scope(&state, &auth, &row).await?;
    Ok(Json(ApiOk::new(row)))
}

/* ============================================================
   PATCH /assistance/{id}/status (admin decision)
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

pub async fn update_status(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(assistance_id): Path<Uuid>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<ApiOk<AssistanceRow>>, ApiError> {
    ensure_funding_staff(&auth)?;

    let target = AssistanceStatus::from_str_name(req.status.trim())
        .ok_or_else(|| ApiError::invalid_status(format!("unknown status '{}'", req.status)))?;

    let row = fetch_assistance(&state.db, assistance_id).await?;
    validate_assistance_transition(row.status, target)?;

    let approved_by = (target == AssistanceStatus::Approved).then_some(auth.user_id);

    // Guarded on the status we read so concurrent decisions cannot race.
    let updated = sqlx::query_as::<_, AssistanceRow>(&format!(
        r#"
        UPDATE assistance_request
        SET status = $2,
            approved_by = COALESCE($3, approved_by),
            updated_at = now()
        WHERE assistance_id = $1
          AND status = $4
        RETURNING {ASSISTANCE_COLUMNS}
        "#
    ))
    .bind(assistance_id)
    .bind(target)
    .bind(approved_by)
    .bind(row.status)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(|| {
        ApiError::Conflict(
            "CONFLICT",
            "assistance request was modified concurrently".into(),
        )
    })?;

    if let Some(uid) = owner_user_id(&state.db, updated.patient_id).await {
        notify_best_effort(
            state.notifier.clone(),
            Some(uid),
            "assistance_status",
            json!({
                "assistance_id": updated.assistance_id,
                "status": updated.status,
            }),
        );
    }

    Ok(Json(ApiOk::new(updated)))
}

/* ============================================================
   POST /assistance/{id}/withdraw
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct WithdrawRequest {
    pub amount: i64,
    pub note: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct WithdrawResponse {
    pub withdrawal: WithdrawalRow,
    pub raised_amount: i64,
    pub withdrawn_amount: i64,
    pub remaining_amount: i64,
}

pub async fn withdraw(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(assistance_id): Path<Uuid>,
    Json(req): Json<WithdrawRequest>,
) -> Result<Json<ApiOk<WithdrawResponse>>, ApiError> {
    ensure_funding_staff(&auth)?;

    let row = fetch_assistance(&state.db, assistance_id).await?;

    // Fast fail on the read balances; the UPDATE below re-checks atomically.
    funding::validate_withdrawal(req.amount, row.raised_amount, row.withdrawn_amount)?;

    let mut tx = state.db.begin().await.map_err(ApiError::db)?;

    let balances = funding::apply_withdrawal(&mut *tx, assistance_id, req.amount).await?;

    let withdrawal = sqlx::query_as::<_, WithdrawalRow>(
        r#"
        INSERT INTO assistance_withdrawal (assistance_id, amount, admin_id, note)
        VALUES ($1, $2, $3, $4)
        RETURNING withdrawal_id, assistance_id, amount, admin_id, note, created_at
        "#,
    )
    .bind(assistance_id)
    .bind(req.amount)
    .bind(auth.user_id)
    .bind(req.note)
    .fetch_one(&mut *tx)
    .await
    .map_err(ApiError::db)?;

    tx.commit().await.map_err(ApiError::db)?;

    let payload = json!({
        "assistance_id": assistance_id,
        "amount": req.amount,
        "withdrawn_amount": balances.withdrawn_amount,
    });
    if let Some(uid) = owner_user_id(&state.db, row.patient_id).await {
        notify_best_effort(
            state.notifier.clone(),
            Some(uid),
            "funds_withdrawn",
            payload.clone(),
        );
    }
    // system-wide activity feed
    notify_best_effort(state.notifier.clone(), None, "funds_withdrawn", payload);

    Ok(Json(ApiOk::new(WithdrawResponse {
        withdrawal,
        raised_amount: balances.raised_amount,
        withdrawn_amount: balances.withdrawn_amount,
        remaining_amount: balances.remaining_amount,
    })))
}

/* ============================================================
   GET /assistance/{id}/withdrawals
   ============================================================ */

pub async fn list_withdrawals(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(assistance_id): Path<Uuid>,
) -> Result<Json<ApiOk<Vec<WithdrawalRow>>>, ApiError> {
    let row = fetch_assistance(&state.db, assistance_id).await?;
    ensure_view_scope(&state, &auth, &row).await?;

    let rows = sqlx::query_as::<_, WithdrawalRow>(
        r#"
        SELECT withdrawal_id, assistance_id, amount, admin_id, note, created_at
        FROM assistance_withdrawal
        WHERE assistance_id = $1
        ORDER BY created_at ASC
        "#,
    )
    .bind(assistance_id)
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(ApiOk::new(rows)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_decisions() {
        use AssistanceStatus::*;
        assert!(validate_assistance_transition(Pending, Approved).is_ok());
        assert!(validate_assistance_transition(Pending, Rejected).is_ok());
        assert!(validate_assistance_transition(Pending, InProgress).is_err());
        assert!(validate_assistance_transition(Pending, Completed).is_err());
    }

    #[test]
    fn test_forward_only_progression() {
        use AssistanceStatus::*;
        assert!(validate_assistance_transition(Approved, InProgress).is_ok());
        assert!(validate_assistance_transition(InProgress, Completed).is_ok());
        // never back to pending
        assert!(validate_assistance_transition(Approved, Pending).is_err());
        assert!(validate_assistance_transition(InProgress, Pending).is_err());
    }

    #[test]
    fn test_terminal_states() {
        use AssistanceStatus::*;
        for target in [Pending, Approved, InProgress, Completed, Rejected] {
            assert!(validate_assistance_transition(Rejected, target).is_err());
            assert!(validate_assistance_transition(Completed, target).is_err());
        }
    }

    #[test]
    fn test_support_window() {
        let d = |s: &str| NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap();
        assert!(validate_support_window(d("2025-06-01"), d("2025-09-01")).is_ok());
        assert!(validate_support_window(d("2025-06-01"), d("2025-06-01")).is_ok());
        assert!(validate_support_window(d("2025-09-01"), d("2025-06-01")).is_err());
    }
}
