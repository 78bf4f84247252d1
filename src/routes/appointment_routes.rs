// src/routes/appointment_routes.rs

use axum::{
    extract::{Path, Query, State},
    routing::{get, patch, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::Row;
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{
        resolve_doctor_id_by_user_id, resolve_patient_id_by_user_id, ApiOk, AppState,
        AppointmentRow, AppointmentStatus, AppointmentType,
    },
    notify::notify_best_effort,
    slots,
};

/*
Roles (app_user.role):
0 patient
1 doctor
2 admin
3 charity_admin
*/

fn is_patient(auth: &AuthContext) -> bool {
    auth.role == 0
}
fn is_doctor(auth: &AuthContext) -> bool {
    auth.role == 1
}
fn is_admin(auth: &AuthContext) -> bool {
    auth.role == 2
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/appointments", get(list_appointments).post(create_appointment))
        .route("/appointments/availability/{doctor_id}", get(get_availability))
        .route(
            "/appointments/{appointment_id}",
            get(get_appointment)
                .patch(patch_appointment)
                .delete(cancel_appointment),
        )
        .route("/appointments/{appointment_id}/status", patch(update_status))
}

/* ============================================================
   Status state machine
   ============================================================ */

fn allowed_targets(current: AppointmentStatus) -> &'static [AppointmentStatus] {
    use AppointmentStatus::*;
    match current {
        Scheduled => &[Confirmed, Cancelled],
        Confirmed => &[InProgress, Completed],
        InProgress => &[Completed, Cancelled, NoShow],
        // terminal
        Completed | Cancelled | NoShow => &[],
    }
}

/// Transition guards, evaluated in order; the first failure wins.
fn validate_transition(
    current: AppointmentStatus,
    target: AppointmentStatus,
    role: i16,
    owns: bool,
    scheduled_time: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), ApiError> {
    use AppointmentStatus::*;

    if current == Confirmed && target == Cancelled {
        return Err(ApiError::illegal_transition(
            "cannot cancel a confirmed appointment",
        ));
    }
    if current == Cancelled && target == Confirmed {
        return Err(ApiError::illegal_transition(
            "cannot confirm a cancelled appointment",
        ));
    }
    if !allowed_targets(current).contains(&target) {
        return Err(ApiError::illegal_transition(format!(
            "cannot move appointment from {} to {}",
            current.as_str(),
            target.as_str()
        )));
    }

    // charity_admin has no appointment authority
    if !(0..=2).contains(&role) {
        return Err(ApiError::forbidden(
            "You do not have permission to update appointments",
        ));
    }
    if !owns {
        return Err(ApiError::forbidden(
            "You may only update your own appointments",
        ));
    }

    // patients may only cancel
    if role == 0 && target != Cancelled {
        return Err(ApiError::forbidden("Patients may only cancel appointments"));
    }

    if scheduled_time < now {
        return Err(ApiError::expired());
    }

    Ok(())
}

/// doctor_notes travels with a status update but stays a clinical field:
/// only doctors and admins may write it.
fn validate_clinical_author(role: i16, doctor_notes: &Option<String>) -> Result<(), ApiError> {
    if doctor_notes.is_some() && !(1..=2).contains(&role) {
        return Err(ApiError::forbidden(
            "Only doctors or admins may write doctor notes",
        ));
    }
    Ok(())
}

/* ============================================================
   Shared lookups
   ============================================================ */

const APPOINTMENT_COLUMNS: &str = r#"
    appointment_id, patient_id, doctor_id, appointment_type, scheduled_time,
    status, patient_notes, doctor_notes, prescriptions, tests_ordered,
    exam_start_time, exam_end_time, created_at, updated_at
"#;

async fn fetch_appointment(
    db: &sqlx::PgPool,
    appointment_id: Uuid,
) -> Result<AppointmentRow, ApiError> {
    sqlx::query_as::<_, AppointmentRow>(&format!(
        r#"
        SELECT {APPOINTMENT_COLUMNS}
        FROM appointment
        WHERE appointment_id = $1
        "#
    ))
    .bind(appointment_id)
    .fetch_optional(db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(|| ApiError::not_found("appointment"))
}

/// true iff the caller is allowed to act on this appointment at all.
async fn caller_owns(
    state: &AppState,
    auth: &AuthContext,
    appt: &AppointmentRow,
) -> Result<bool, ApiError> {
    if is_admin(auth) {
        return Ok(true);
    }
    if is_patient(auth) {
        let pid = resolve_patient_id_by_user_id(&state.db, auth.user_id).await?;
        return Ok(pid == appt.patient_id);
    }
    if is_doctor(auth) {
        let did = resolve_doctor_id_by_user_id(&state.db, auth.user_id).await?;
        return Ok(did == appt.doctor_id);
    }
    Ok(false)
}

async fn patient_user_id(db: &sqlx::PgPool, patient_id: Uuid) -> Option<Uuid> {
    let row = sqlx::query(r#"SELECT user_id FROM patient WHERE patient_id = $1"#)
        .bind(patient_id)
        .fetch_optional(db)
        .await
        .ok()??;
    row.try_get("user_id").ok()
}

async fn doctor_user_id(db: &sqlx::PgPool, doctor_id: Uuid) -> Option<Uuid> {
    let row = sqlx::query(r#"SELECT user_id FROM doctor WHERE doctor_id = $1"#)
        .bind(doctor_id)
        .fetch_optional(db)
        .await
        .ok()??;
    row.try_get("user_id").ok()
}

/* ============================================================
   POST /appointments (book a slot)
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct CreateAppointmentRequest {
    pub doctor_id: Uuid,
    pub date: String, // YYYY-MM-DD
    pub time: String, // HH:mm
    pub appointment_type: String,
    pub patient_notes: Option<String>,
}

pub async fn create_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateAppointmentRequest>,
) -> Result<Json<ApiOk<AppointmentRow>>, ApiError> {
    if !is_patient(&auth) {
        return Err(ApiError::forbidden("Only patients can book appointments"));
    }

    let date = NaiveDate::parse_from_str(req.date.trim(), "%Y-%m-%d")
        .map_err(|_| ApiError::validation("date must be YYYY-MM-DD"))?;
    let time = slots::parse_hhmm(&req.time)
        .ok_or_else(|| ApiError::validation("time must be HH:mm"))?;
    let appointment_type = AppointmentType::from_str_name(req.appointment_type.trim())
        .ok_or_else(|| ApiError::validation("unknown appointment_type"))?;

    let patient_id = resolve_patient_id_by_user_id(&state.db, auth.user_id).await?;

    let doctor = sqlx::query(r#"SELECT user_id FROM doctor WHERE doctor_id = $1"#)
        .bind(req.doctor_id)
        .fetch_optional(&state.db)
        .await
        .map_err(ApiError::db)?
        .ok_or_else(|| ApiError::not_found("doctor"))?;
    let doctor_user: Uuid = doctor
        .try_get("user_id")
        .map_err(|e| ApiError::Internal(format!("row decode error: {e}")))?;

    let scheduled_time = date.and_time(time).and_utc();

    // Consume the slot and write the appointment in one transaction so a
    // failed insert cannot strand a consumed slot.
    let mut tx = state.db.begin().await.map_err(ApiError::db)?;

    // A date without a declaration books against the weekly template; it is
    // materialized into a declared entry first so consume sees one set of
    // times and every advertised template time is actually bookable.
    slots::materialize_from_template(&mut *tx, req.doctor_id, date).await?;
    slots::consume(&mut *tx, req.doctor_id, date, time).await?;

    let appt = sqlx::query_as::<_, AppointmentRow>(&format!(
        r#"
        INSERT INTO appointment (
            patient_id, doctor_id, appointment_type, scheduled_time,
            status, patient_notes, prescriptions, tests_ordered
        )
        VALUES ($1, $2, $3, $4, 0, $5, '{{}}', '{{}}')
        RETURNING {APPOINTMENT_COLUMNS}
        "#
    ))
    .bind(patient_id)
    .bind(req.doctor_id)
    .bind(appointment_type)
    .bind(scheduled_time)
    .bind(req.patient_notes)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| ApiError::BadRequest("APPOINTMENT_CREATE_FAILED", format!("{e}")))?;

    tx.commit().await.map_err(ApiError::db)?;

    notify_best_effort(
        state.notifier.clone(),
        Some(doctor_user),
        "appointment_booked",
        json!({
            "appointment_id": appt.appointment_id,
            "scheduled_time": appt.scheduled_time,
        }),
    );

    Ok(Json(ApiOk::new(appt)))
}

/* ============================================================
   GET /appointments (role-filtered list)
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
}

pub async fn list_appointments(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(q): Query<ListQuery>,
) -> Result<Json<ApiOk<Vec<AppointmentRow>>>, ApiError> {
    let status = match q.status.as_deref() {
        Some(s) => Some(
            AppointmentStatus::from_str_name(s)
                .ok_or_else(|| ApiError::invalid_status("unknown status filter"))?,
        ),
        None => None,
    };

    let (patient_filter, doctor_filter) = if is_patient(&auth) {
        (
            Some(resolve_patient_id_by_user_id(&state.db, auth.user_id).await?),
            None,
        )
    } else if is_doctor(&auth) {
        (
            None,
            Some(resolve_doctor_id_by_user_id(&state.db, auth.user_id).await?),
        )
    } else if is_admin(&auth) {
        (None, None)
    } else {
        return Err(ApiError::forbidden(
            "You do not have permission to view appointments",
        ));
    };

    let rows = sqlx::query_as::<_, AppointmentRow>(&format!(
        r#"
        SELECT {APPOINTMENT_COLUMNS}
        FROM appointment
        WHERE ($1::uuid IS NULL OR patient_id = $1)
          AND ($2::uuid IS NULL OR doctor_id = $2)
          AND ($3::smallint IS NULL OR status = $3)
        ORDER BY scheduled_time ASC
        "#
    ))
    .bind(patient_filter)
    .bind(doctor_filter)
    .bind(status)
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(ApiOk::new(rows)))
}

/* ============================================================
   GET /appointments/{id}
   ============================================================ */

pub async fn get_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<ApiOk<AppointmentRow>>, ApiError> {
    let appt = fetch_appointment(&state.db, appointment_id).await?;
    if !caller_owns(&state, &auth, &appt).await? {
        return Err(ApiError::forbidden(
            "You may only view your own appointments",
        ));
    }
    Ok(Json(ApiOk::new(appt)))
}

/* ============================================================
   PATCH /appointments/{id}/status + DELETE /appointments/{id}
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
    pub doctor_notes: Option<String>,
}

pub async fn update_status(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<ApiOk<AppointmentRow>>, ApiError> {
    let target = AppointmentStatus::from_str_name(req.status.trim())
        .ok_or_else(|| ApiError::invalid_status(format!("unknown status '{}'", req.status)))?;
    transition(&state, &auth, appointment_id, target, req.doctor_notes).await
}

pub async fn cancel_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<ApiOk<AppointmentRow>>, ApiError> {
    transition(&state, &auth, appointment_id, AppointmentStatus::Cancelled, None).await
}

async fn transition(
    state: &AppState,
    auth: &AuthContext,
    appointment_id: Uuid,
    target: AppointmentStatus,
    doctor_notes: Option<String>,
) -> Result<Json<ApiOk<AppointmentRow>>, ApiError> {
    let appt = fetch_appointment(&state.db, appointment_id).await?;
    let owns = caller_owns(state, auth, &appt).await?;

    validate_transition(
        appt.status,
        target,
        auth.role,
        owns,
        appt.scheduled_time,
        Utc::now(),
    )?;
    validate_clinical_author(auth.role, &doctor_notes)?;

    let now = Utc::now();
    let stamp_start = (target == AppointmentStatus::InProgress).then_some(now);
    let stamp_end = (target == AppointmentStatus::Completed).then_some(now);

    let mut tx = state.db.begin().await.map_err(ApiError::db)?;

    // On cancellation the slot goes back first, so the doctor's calendar is
    // never missing a freed time while the appointment row lags behind.
    if target == AppointmentStatus::Cancelled {
        slots::restore(
            &mut *tx,
            appt.doctor_id,
            appt.scheduled_time.date_naive(),
            appt.scheduled_time.time(),
        )
        .await?;
    }

    // Guarded on the status we read: a concurrent transition wins and we
    // roll back, including any slot restore above.
    let updated = sqlx::query_as::<_, AppointmentRow>(&format!(
        r#"
        UPDATE appointment
        SET status = $2,
            exam_start_time = COALESCE(exam_start_time, $3),
            exam_end_time   = COALESCE(exam_end_time, $4),
            doctor_notes    = COALESCE($5, doctor_notes),
            updated_at = now()
        WHERE appointment_id = $1
          AND status = $6
        RETURNING {APPOINTMENT_COLUMNS}
        "#
    ))
    .bind(appointment_id)
    .bind(target)
    .bind(stamp_start)
    .bind(stamp_end)
    .bind(doctor_notes)
    .bind(appt.status)
    .fetch_optional(&mut *tx)
    .await
    .map_err(ApiError::db)?;

    let Some(updated) = updated else {
        return Err(ApiError::Conflict(
            "CONFLICT",
            "appointment was modified concurrently".into(),
        ));
    };

    tx.commit().await.map_err(ApiError::db)?;

    let payload = json!({
        "appointment_id": updated.appointment_id,
        "status": updated.status,
        "scheduled_time": updated.scheduled_time,
    });
    if let Some(uid) = patient_user_id(&state.db, updated.patient_id).await {
        notify_best_effort(
            state.notifier.clone(),
            Some(uid),
            "appointment_status",
            payload.clone(),
        );
    }
    if let Some(uid) = doctor_user_id(&state.db, updated.doctor_id).await {
        notify_best_effort(state.notifier.clone(), Some(uid), "appointment_status", payload);
    }

    Ok(Json(ApiOk::new(updated)))
}

/* ============================================================
   PATCH /appointments/{id}  (notes / prescriptions / tests)
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct PatchAppointmentRequest {
    pub patient_notes: Option<String>,
    pub doctor_notes: Option<String>,
    pub prescriptions: Option<Vec<String>>,
    pub tests_ordered: Option<Vec<String>>,
}

pub async fn patch_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
    Json(req): Json<PatchAppointmentRequest>,
) -> Result<Json<ApiOk<AppointmentRow>>, ApiError> {
    let appt = fetch_appointment(&state.db, appointment_id).await?;
    if !caller_owns(&state, &auth, &appt).await? {
        return Err(ApiError::forbidden(
            "You may only update your own appointments",
        ));
    }

    // Clinical fields are the doctor's (or admin's) to write.
    if is_patient(&auth)
        && (req.doctor_notes.is_some()
            || req.prescriptions.is_some()
            || req.tests_ordered.is_some())
    {
        return Err(ApiError::forbidden(
            "Patients may only update their own notes",
        ));
    }

    let updated = sqlx::query_as::<_, AppointmentRow>(&format!(
        r#"
        UPDATE appointment
        SET patient_notes = COALESCE($2, patient_notes),
            doctor_notes  = COALESCE($3, doctor_notes),
            prescriptions = COALESCE($4, prescriptions),
            tests_ordered = COALESCE($5, tests_ordered),
            updated_at = now()
        WHERE appointment_id = $1
        RETURNING {APPOINTMENT_COLUMNS}
        "#
    ))
    .bind(appointment_id)
    .bind(req.patient_notes)
    .bind(req.doctor_notes)
    .bind(req.prescriptions)
    .bind(req.tests_ordered)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| ApiError::BadRequest("APPOINTMENT_UPDATE_FAILED", format!("{e}")))?
    .ok_or_else(|| ApiError::not_found("appointment"))?;

    Ok(Json(ApiOk::new(updated)))
}

/* ============================================================
   GET /appointments/availability/{doctor_id}?date=
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub date: String, // YYYY-MM-DD
}

#[derive(Debug, Serialize)]
pub struct AvailabilityDto {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub times: Vec<String>,
    pub source: &'static str, // "declared" | "template"
}

pub async fn get_availability(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(doctor_id): Path<Uuid>,
    Query(q): Query<AvailabilityQuery>,
) -> Result<Json<ApiOk<AvailabilityDto>>, ApiError> {
    let date = NaiveDate::parse_from_str(q.date.trim(), "%Y-%m-%d")
        .map_err(|_| ApiError::validation("date must be YYYY-MM-DD"))?;

    let exists = sqlx::query(r#"SELECT 1 FROM doctor WHERE doctor_id = $1"#)
        .bind(doctor_id)
        .fetch_optional(&state.db)
        .await
        .map_err(ApiError::db)?;
    if exists.is_none() {
        return Err(ApiError::not_found("doctor"));
    }

    // Manually declared slots are authoritative: booked times were already
    // removed at booking time, so the stored set is the open set.
    if let Some(slot) = slots::find_slot(&state.db, doctor_id, date).await? {
        let times = if slot.is_active {
            slot.times.into_iter().map(slots::fmt_hhmm).collect()
        } else {
            vec![]
        };
        return Ok(Json(ApiOk::new(AvailabilityDto {
            doctor_id,
            date,
            times,
            source: "declared",
        })));
    }

    // Fallback: expand the weekly template and filter out times still held
    // by live appointments. Booking an undeclared date materializes this
    // same projection, so everything listed here is bookable.
    let weekday = chrono::Datelike::weekday(&date).num_days_from_monday() as i16;
    let template_rows = sqlx::query(
        r#"
        SELECT start_time, end_time
        FROM doctor_weekly_template
        WHERE doctor_id = $1 AND weekday = $2
        ORDER BY start_time ASC
        "#,
    )
    .bind(doctor_id)
    .bind(weekday)
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    let mut open = Vec::new();
    for r in template_rows {
        let start: chrono::NaiveTime = r
            .try_get("start_time")
            .map_err(|e| ApiError::Internal(format!("row decode error: {e}")))?;
        let end: chrono::NaiveTime = r
            .try_get("end_time")
            .map_err(|e| ApiError::Internal(format!("row decode error: {e}")))?;
        open.extend(slots::expand_template(start, end));
    }
    let open = slots::normalize_times(open);

    let booked = slots::booked_times(&state.db, doctor_id, date).await?;
    let times = slots::open_times(open, &booked)
        .into_iter()
        .map(slots::fmt_hhmm)
        .collect();

    Ok(Json(ApiOk::new(AvailabilityDto {
        doctor_id,
        date,
        times,
        source: "template",
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> DateTime<Utc> {
        chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M")
            .unwrap()
            .and_utc()
    }

    fn check(
        current: AppointmentStatus,
        target: AppointmentStatus,
        role: i16,
    ) -> Result<(), ApiError> {
        // future appointment, caller owns it
        validate_transition(
            current,
            target,
            role,
            true,
            ts("2099-06-01 09:00"),
            ts("2025-06-01 09:00"),
        )
    }

    #[test]
    fn test_scheduled_transitions() {
        use AppointmentStatus::*;
        assert!(check(Scheduled, Confirmed, 2).is_ok());
        assert!(check(Scheduled, Cancelled, 2).is_ok());
        assert!(check(Scheduled, Completed, 2).is_err());
        assert!(check(Scheduled, InProgress, 2).is_err());
        assert!(check(Scheduled, NoShow, 2).is_err());
    }

    #[test]
    fn test_confirmed_cannot_be_cancelled() {
        use AppointmentStatus::*;
        assert!(check(Confirmed, Cancelled, 2).is_err());
        assert!(check(Confirmed, InProgress, 2).is_ok());
        assert!(check(Confirmed, Completed, 2).is_ok());
    }

    #[test]
    fn test_cancelled_cannot_be_confirmed() {
        use AppointmentStatus::*;
        assert!(check(Cancelled, Confirmed, 2).is_err());
    }

    #[test]
    fn test_in_progress_transitions() {
        use AppointmentStatus::*;
        assert!(check(InProgress, Completed, 2).is_ok());
        assert!(check(InProgress, Cancelled, 2).is_ok());
        assert!(check(InProgress, NoShow, 2).is_ok());
        assert!(check(InProgress, Scheduled, 2).is_err());
    }

    #[test]
    fn test_terminal_states_are_final() {
        use AppointmentStatus::*;
        for terminal in [Completed, Cancelled, NoShow] {
            for target in [Scheduled, Confirmed, InProgress, Completed, Cancelled, NoShow] {
                if terminal == Cancelled && target == Confirmed {
                    continue; // covered by its own test
                }
                assert!(
                    check(terminal, target, 2).is_err(),
                    "{terminal:?} -> {target:?} should be rejected"
                );
            }
        }
    }

    #[test]
    fn test_patient_may_only_cancel() {
        use AppointmentStatus::*;
        assert!(check(Scheduled, Cancelled, 0).is_ok());
        assert!(check(Scheduled, Confirmed, 0).is_err());
        assert!(check(InProgress, Completed, 0).is_err());
    }

    #[test]
    fn test_charity_admin_has_no_appointment_authority() {
        use AppointmentStatus::*;
        assert!(check(Scheduled, Confirmed, 3).is_err());
        assert!(check(Scheduled, Cancelled, 3).is_err());
    }

    #[test]
    fn test_non_owner_is_forbidden() {
        use AppointmentStatus::*;
        let res = validate_transition(
            Scheduled,
            Cancelled,
            0,
            false,
            ts("2099-06-01 09:00"),
            ts("2025-06-01 09:00"),
        );
        assert!(res.is_err());
    }

    #[test]
    fn test_past_appointment_is_expired() {
        use AppointmentStatus::*;
        // scheduled_time strictly before now: every mutation blocked
        let res = validate_transition(
            Scheduled,
            Cancelled,
            2,
            true,
            ts("2025-06-01 09:00"),
            ts("2025-06-01 09:01"),
        );
        assert!(matches!(res, Err(ApiError::BadRequest(code, _)) if code == "EXPIRED"));
    }

    #[test]
    fn test_guard_order_transition_before_role() {
        use AppointmentStatus::*;
        // an off-table transition reports ILLEGAL_TRANSITION even when the
        // caller's role would also have been rejected
        let res = check(Completed, Confirmed, 3);
        assert!(matches!(res, Err(ApiError::BadRequest(code, _)) if code == "ILLEGAL_TRANSITION"));
    }

    #[test]
    fn test_patient_cannot_smuggle_doctor_notes_into_a_cancel() {
        assert!(validate_clinical_author(0, &Some("note".into())).is_err());
        assert!(validate_clinical_author(0, &None).is_ok());
    }

    #[test]
    fn test_doctor_and_admin_may_write_doctor_notes() {
        assert!(validate_clinical_author(1, &Some("note".into())).is_ok());
        assert!(validate_clinical_author(2, &Some("note".into())).is_ok());
        assert!(validate_clinical_author(3, &Some("note".into())).is_err());
    }

    #[test]
    fn test_expired_is_checked_last() {
        use AppointmentStatus::*;
        // past appointment, but the transition itself is illegal: the
        // transition guard fires first
        let res = validate_transition(
            Confirmed,
            Cancelled,
            2,
            true,
            ts("2020-01-01 09:00"),
            ts("2025-06-01 09:00"),
        );
        assert!(matches!(res, Err(ApiError::BadRequest(code, _)) if code == "ILLEGAL_TRANSITION"));
    }
}
