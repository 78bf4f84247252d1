// src/routes/slot_routes.rs
//
// Doctors declare bookable times per calendar date; a weekly working-hours
// template serves as a read-only fallback for undeclared dates.

use axum::{
    extract::{Path, State},
    routing::{get, put},
    Json, Router,
};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use sqlx::Row;
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{resolve_doctor_id_by_user_id, ApiOk, AppState, DoctorSlotRow},
    slots,
};

// roles: 0 patient, 1 doctor, 2 admin, 3 charity_admin

fn is_doctor(auth: &AuthContext) -> bool {
    auth.role == 1
}
fn is_admin(auth: &AuthContext) -> bool {
    auth.role == 2
}

/// Doctors manage their own calendar; admins can manage any.
async fn ensure_manage_scope(
    state: &AppState,
    auth: &AuthContext,
    doctor_id: Uuid,
) -> Result<(), ApiError> {
    if is_admin(auth) {
        return Ok(());
    }
    if is_doctor(auth) {
        let own = resolve_doctor_id_by_user_id(&state.db, auth.user_id).await?;
        if own == doctor_id {
            return Ok(());
        }
        return Err(ApiError::forbidden(
            "Doctors may only manage their own availability",
        ));
    }
    Err(ApiError::forbidden(
        "You do not have permission to manage availability",
    ))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/doctors/{doctor_id}/slots",
            get(list_slots).put(put_slots),
        )
        .route(
            "/doctors/{doctor_id}/schedule",
            get(get_weekly_schedule).put(put_weekly_schedule),
        )
}

/* ============================================================
   Declared per-date slots
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct DeclareSlotEntry {
    pub date: String,        // YYYY-MM-DD
    pub times: Vec<String>,  // HH:mm
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct PutSlotsRequest {
    pub slots: Vec<DeclareSlotEntry>,
}

/// Parse and normalize a declaration payload: at most one entry per date,
/// no empty time sets, times deduped and ascending.
fn normalize_declarations(
    entries: &[DeclareSlotEntry],
) -> Result<Vec<(NaiveDate, Vec<NaiveTime>, bool)>, ApiError> {
    let mut out: Vec<(NaiveDate, Vec<NaiveTime>, bool)> = Vec::with_capacity(entries.len());

    for e in entries {
        let date = NaiveDate::parse_from_str(e.date.trim(), "%Y-%m-%d")
            .map_err(|_| ApiError::validation(format!("bad date '{}' (want YYYY-MM-DD)", e.date)))?;

        if out.iter().any(|(d, _, _)| *d == date) {
            return Err(ApiError::validation(format!(
                "duplicate slot entry for date {date}"
            )));
        }
        if e.times.is_empty() {
            return Err(ApiError::validation(format!(
                "slot entry for {date} has no times"
            )));
        }

        let mut times = Vec::with_capacity(e.times.len());
        for t in &e.times {
            let parsed = slots::parse_hhmm(t)
                .ok_or_else(|| ApiError::validation(format!("bad time '{t}' (want HH:mm)")))?;
            times.push(parsed);
        }
        let times = slots::normalize_times(times);

        out.push((date, times, e.is_active.unwrap_or(true)));
    }

    Ok(out)
}

pub async fn list_slots(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<ApiOk<Vec<SlotDto>>>, ApiError> {
    let rows = sqlx::query_as::<_, DoctorSlotRow>(
        r#"
        SELECT doctor_id, slot_date, times, is_active
        FROM doctor_slot
        WHERE doctor_id = $1
        ORDER BY slot_date ASC
        "#,
    )
    .bind(doctor_id)
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(ApiOk::new(rows.into_iter().map(SlotDto::from).collect())))
}

#[derive(Debug, Serialize)]
pub struct SlotDto {
    pub date: NaiveDate,
    pub times: Vec<String>,
    pub is_active: bool,
}

impl From<DoctorSlotRow> for SlotDto {
    fn from(r: DoctorSlotRow) -> Self {
        SlotDto {
            date: r.slot_date,
            times: r.times.into_iter().map(slots::fmt_hhmm).collect(),
            is_active: r.is_active,
        }
    }
}

/// Replace the doctor's whole declared calendar (delete + insert in one
/// transaction).
pub async fn put_slots(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(doctor_id): Path<Uuid>,
    Json(req): Json<PutSlotsRequest>,
) -> Result<Json<ApiOk<Vec<SlotDto>>>, ApiError> {
    ensure_manage_scope(&state, &auth, doctor_id).await?;

    let normalized = normalize_declarations(&req.slots)?;

    let mut tx = state.db.begin().await.map_err(ApiError::db)?;

    sqlx::query(r#"DELETE FROM doctor_slot WHERE doctor_id = $1"#)
        .bind(doctor_id)
        .execute(&mut *tx)
        .await
        .map_err(ApiError::db)?;

    for (date, times, is_active) in &normalized {
        sqlx::query(
            r#"
            INSERT INTO doctor_slot (doctor_id, slot_date, times, is_active)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(doctor_id)
        .bind(date)
        .bind(times)
        .bind(is_active)
        .execute(&mut *tx)
        .await
        .map_err(|e| ApiError::BadRequest("SLOT_DECLARE_FAILED", format!("{e}")))?;
    }

    tx.commit().await.map_err(ApiError::db)?;

    Ok(Json(ApiOk::new(
        normalized
            .into_iter()
            .map(|(date, times, is_active)| SlotDto {
                date,
                times: times.into_iter().map(slots::fmt_hhmm).collect(),
                is_active,
            })
            .collect(),
    )))
}

/* ============================================================
   Weekly working-hours template (read-only fallback)
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct TemplateEntry {
    pub weekday: i16, // 0 = Monday .. 6 = Sunday
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Deserialize)]
pub struct PutScheduleRequest {
    pub entries: Vec<TemplateEntry>,
}

#[derive(Debug, Serialize)]
pub struct TemplateDto {
    pub weekday: i16,
    pub start_time: String,
    pub end_time: String,
}

fn validate_template(entries: &[TemplateEntry]) -> Result<Vec<(i16, NaiveTime, NaiveTime)>, ApiError> {
    let mut out = Vec::with_capacity(entries.len());
    for e in entries {
        if !(0..=6).contains(&e.weekday) {
            return Err(ApiError::validation("weekday must be 0..=6"));
        }
        let start = slots::parse_hhmm(&e.start_time)
            .ok_or_else(|| ApiError::validation("start_time must be HH:mm"))?;
        let end = slots::parse_hhmm(&e.end_time)
            .ok_or_else(|| ApiError::validation("end_time must be HH:mm"))?;
        if end <= start {
            return Err(ApiError::validation("end_time must be after start_time"));
        }
        out.push((e.weekday, start, end));
    }
    Ok(out)
}

pub async fn get_weekly_schedule(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<ApiOk<Vec<TemplateDto>>>, ApiError> {
    let rows = sqlx::query(
        r#"
        SELECT weekday, start_time, end_time
        FROM doctor_weekly_template
        WHERE doctor_id = $1
        ORDER BY weekday ASC, start_time ASC
        "#,
    )
    .bind(doctor_id)
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    let mut out = Vec::with_capacity(rows.len());
    for r in rows {
        let err = |e: sqlx::Error| ApiError::Internal(format!("row decode error: {e}"));
        let weekday: i16 = r.try_get("weekday").map_err(err)?;
        let start: NaiveTime = r.try_get("start_time").map_err(err)?;
        let end: NaiveTime = r.try_get("end_time").map_err(err)?;
        out.push(TemplateDto {
            weekday,
            start_time: slots::fmt_hhmm(start),
            end_time: slots::fmt_hhmm(end),
        });
    }

    Ok(Json(ApiOk::new(out)))
}

pub async fn put_weekly_schedule(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(doctor_id): Path<Uuid>,
    Json(req): Json<PutScheduleRequest>,
) -> Result<Json<ApiOk<Vec<TemplateDto>>>, ApiError> {
    ensure_manage_scope(&state, &auth, doctor_id).await?;

    let validated = validate_template(&req.entries)?;

    let mut tx = state.db.begin().await.map_err(ApiError::db)?;

    sqlx::query(r#"DELETE FROM doctor_weekly_template WHERE doctor_id = $1"#)
        .bind(doctor_id)
        .execute(&mut *tx)
        .await
        .map_err(ApiError::db)?;

    for (weekday, start, end) in &validated {
        sqlx::query(
            r#"
            INSERT INTO doctor_weekly_template (doctor_id, weekday, start_time, end_time)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(doctor_id)
        .bind(weekday)
        .bind(start)
        .bind(end)
        .execute(&mut *tx)
        .await
        .map_err(|e| ApiError::BadRequest("SCHEDULE_UPDATE_FAILED", format!("{e}")))?;
    }

    tx.commit().await.map_err(ApiError::db)?;

    Ok(Json(ApiOk::new(
        validated
            .into_iter()
            .map(|(weekday, start, end)| TemplateDto {
                weekday,
                start_time: slots::fmt_hhmm(start),
                end_time: slots::fmt_hhmm(end),
            })
            .collect(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(date: &str, times: &[&str]) -> DeclareSlotEntry {
        DeclareSlotEntry {
            date: date.into(),
            times: times.iter().map(|s| s.to_string()).collect(),
            is_active: None,
        }
    }

    #[test]
    fn test_normalize_sorts_and_dedupes_times() {
        let got = normalize_declarations(&[entry("2025-06-01", &["09:30", "09:00", "09:30"])])
            .unwrap();
        assert_eq!(got.len(), 1);
        let times: Vec<String> = got[0].1.iter().copied().map(slots::fmt_hhmm).collect();
        assert_eq!(times, vec!["09:00", "09:30"]);
        assert!(got[0].2); // defaults active
    }

    #[test]
    fn test_normalize_rejects_duplicate_dates() {
        let res = normalize_declarations(&[
            entry("2025-06-01", &["09:00"]),
            entry("2025-06-01", &["10:00"]),
        ]);
        assert!(res.is_err());
    }

    #[test]
    fn test_normalize_rejects_empty_times() {
        assert!(normalize_declarations(&[entry("2025-06-01", &[])]).is_err());
    }

    #[test]
    fn test_normalize_rejects_bad_input() {
        assert!(normalize_declarations(&[entry("June 1st", &["09:00"])]).is_err());
        assert!(normalize_declarations(&[entry("2025-06-01", &["9am"])]).is_err());
    }

    #[test]
    fn test_validate_template() {
        let ok = validate_template(&[TemplateEntry {
            weekday: 0,
            start_time: "09:00".into(),
            end_time: "12:00".into(),
        }]);
        assert!(ok.is_ok());

        let bad_day = validate_template(&[TemplateEntry {
            weekday: 7,
            start_time: "09:00".into(),
            end_time: "12:00".into(),
        }]);
        assert!(bad_day.is_err());

        let inverted = validate_template(&[TemplateEntry {
            weekday: 1,
            start_time: "12:00".into(),
            end_time: "09:00".into(),
        }]);
        assert!(inverted.is_err());
    }
}
