// Doctor availability: one row per (doctor, date), times kept distinct and
// ascending. Consume/restore are single conditional statements so two
// concurrent bookings for the same time cannot both succeed.

use chrono::{NaiveDate, NaiveTime};
use sqlx::{PgConnection, Row};
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::DoctorSlotRow;

pub const SLOT_INCREMENT_MINUTES: u32 = 30;

/* ============================================================
   Time-of-day helpers (HH:mm wire format)
   ============================================================ */

pub fn parse_hhmm(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M").ok()
}

pub fn fmt_hhmm(t: NaiveTime) -> String {
    t.format("%H:%M").to_string()
}

/// Dedupe + ascending sort for a declared time set.
pub fn normalize_times(mut times: Vec<NaiveTime>) -> Vec<NaiveTime> {
    times.sort();
    times.dedup();
    times
}

/// Expand a working-hours range into bookable starts at 30-minute
/// increments: start inclusive, end exclusive.
pub fn expand_template(start: NaiveTime, end: NaiveTime) -> Vec<NaiveTime> {
    let mut out = Vec::new();
    if end <= start {
        return out;
    }
    let mut t = start;
    while t < end {
        out.push(t);
        let next = t + chrono::Duration::minutes(SLOT_INCREMENT_MINUTES as i64);
        // NaiveTime arithmetic wraps at midnight; stop instead of looping
        if next <= t {
            break;
        }
        t = next;
    }
    out
}

/// Expanded template times not already held by a live appointment.
pub fn open_times(expanded: Vec<NaiveTime>, booked: &[NaiveTime]) -> Vec<NaiveTime> {
    expanded.into_iter().filter(|t| !booked.contains(t)).collect()
}

/* ============================================================
   Persistent slot operations
   ============================================================ */

pub async fn find_slot(
    db: &sqlx::PgPool,
    doctor_id: Uuid,
    date: NaiveDate,
) -> Result<Option<DoctorSlotRow>, ApiError> {
    sqlx::query_as::<_, DoctorSlotRow>(
        r#"
        SELECT doctor_id, slot_date, times, is_active
        FROM doctor_slot
        WHERE doctor_id = $1 AND slot_date = $2
        "#,
    )
    .bind(doctor_id)
    .bind(date)
    .fetch_optional(db)
    .await
    .map_err(ApiError::db)
}

/// Remove `time` from the doctor's declared set for `date`.
/// The `$3 = ANY(times)` condition makes the check and the removal one
/// statement: a losing concurrent booking sees zero rows and fails with
/// SLOT_UNAVAILABLE. An emptied set drops the whole date entry.
pub async fn consume(
    conn: &mut PgConnection,
    doctor_id: Uuid,
    date: NaiveDate,
    time: NaiveTime,
) -> Result<(), ApiError> {
    let row = sqlx::query(
        r#"
        UPDATE doctor_slot
        SET times = array_remove(times, $3),
            updated_at = now()
        WHERE doctor_id = $1
          AND slot_date = $2
          AND is_active
          AND $3 = ANY(times)
        RETURNING cardinality(times) AS remaining
        "#,
    )
    .bind(doctor_id)
    .bind(date)
    .bind(time)
    .fetch_optional(&mut *conn)
    .await
    .map_err(ApiError::db)?;

    let Some(row) = row else {
        return Err(ApiError::slot_unavailable());
    };

    let remaining: i32 = row
        .try_get("remaining")
        .map_err(|e| ApiError::Internal(format!("row decode error: {e}")))?;

    if remaining == 0 {
        sqlx::query(
            r#"
            DELETE FROM doctor_slot
            WHERE doctor_id = $1 AND slot_date = $2 AND cardinality(times) = 0
            "#,
        )
        .bind(doctor_id)
        .bind(date)
        .execute(&mut *conn)
        .await
        .map_err(ApiError::db)?;
    }

    Ok(())
}

/// Put `time` back into the doctor's set for `date`. Idempotent: the
/// distinct+sorted aggregation makes a repeated restore a no-op, and a
/// missing date entry is recreated active.
pub async fn restore(
    conn: &mut PgConnection,
    doctor_id: Uuid,
    date: NaiveDate,
    time: NaiveTime,
) -> Result<(), ApiError> {
    sqlx::query(
        r#"
        INSERT INTO doctor_slot (doctor_id, slot_date, times, is_active)
        VALUES ($1, $2, ARRAY[$3::time], true)
        ON CONFLICT (doctor_id, slot_date) DO UPDATE
        SET times = (
                SELECT array_agg(DISTINCT t ORDER BY t)
                FROM unnest(doctor_slot.times || excluded.times) AS t
            ),
            updated_at = now()
        "#,
    )
    .bind(doctor_id)
    .bind(date)
    .bind(time)
    .execute(&mut *conn)
    .await
    .map_err(ApiError::db)?;

    Ok(())
}

/// Turn the weekly template into a declared entry for `date` when none
/// exists, minus times already held by live appointments. An existing
/// declaration always wins, including one a concurrent booking just wrote.
pub async fn materialize_from_template(
    conn: &mut PgConnection,
    doctor_id: Uuid,
    date: NaiveDate,
) -> Result<(), ApiError> {
    let declared = sqlx::query(
        r#"SELECT 1 FROM doctor_slot WHERE doctor_id = $1 AND slot_date = $2"#,
    )
    .bind(doctor_id)
    .bind(date)
    .fetch_optional(&mut *conn)
    .await
    .map_err(ApiError::db)?;
    if declared.is_some() {
        return Ok(());
    }

    let weekday = chrono::Datelike::weekday(&date).num_days_from_monday() as i16;
    let rows = sqlx::query(
        r#"
        SELECT start_time, end_time
        FROM doctor_weekly_template
        WHERE doctor_id = $1 AND weekday = $2
        ORDER BY start_time ASC
        "#,
    )
    .bind(doctor_id)
    .bind(weekday)
    .fetch_all(&mut *conn)
    .await
    .map_err(ApiError::db)?;

    let mut expanded = Vec::new();
    for r in rows {
        let err = |e: sqlx::Error| ApiError::Internal(format!("row decode error: {e}"));
        let start: NaiveTime = r.try_get("start_time").map_err(err)?;
        let end: NaiveTime = r.try_get("end_time").map_err(err)?;
        expanded.extend(expand_template(start, end));
    }
    let expanded = normalize_times(expanded);

    let booked = booked_times(&mut *conn, doctor_id, date).await?;
    let times = open_times(expanded, &booked);
    if times.is_empty() {
        return Ok(());
    }

    sqlx::query(
        r#"
        INSERT INTO doctor_slot (doctor_id, slot_date, times, is_active)
        VALUES ($1, $2, $3, true)
        ON CONFLICT (doctor_id, slot_date) DO NOTHING
        "#,
    )
    .bind(doctor_id)
    .bind(date)
    .bind(times)
    .execute(&mut *conn)
    .await
    .map_err(ApiError::db)?;

    Ok(())
}

/// Times already taken by appointments still holding the slot for `date`.
/// Used to filter the weekly-template fallback at read time.
pub async fn booked_times(
    ex: impl sqlx::PgExecutor<'_>,
    doctor_id: Uuid,
    date: NaiveDate,
) -> Result<Vec<NaiveTime>, ApiError> {
    let day_start = date.and_hms_opt(0, 0, 0).unwrap().and_utc();
    let day_end = day_start + chrono::Duration::days(1);

    let rows = sqlx::query(
        r#"
        SELECT scheduled_time
        FROM appointment
        WHERE doctor_id = $1
          AND scheduled_time >= $2
          AND scheduled_time <  $3
          AND status IN (0, 1, 2) -- scheduled, confirmed, in_progress
        "#,
    )
    .bind(doctor_id)
    .bind(day_start)
    .bind(day_end)
    .fetch_all(ex)
    .await
    .map_err(ApiError::db)?;

    let mut times = Vec::with_capacity(rows.len());
    for r in rows {
        let ts: chrono::DateTime<chrono::Utc> = r
            .try_get("scheduled_time")
            .map_err(|e| ApiError::Internal(format!("row decode error: {e}")))?;
        times.push(ts.time());
    }
    Ok(times)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> NaiveTime {
        parse_hhmm(s).unwrap()
    }

    #[test]
    fn test_parse_hhmm() {
        assert_eq!(parse_hhmm("09:00"), NaiveTime::from_hms_opt(9, 0, 0));
        assert_eq!(parse_hhmm(" 14:30 "), NaiveTime::from_hms_opt(14, 30, 0));
        assert!(parse_hhmm("9am").is_none());
        assert!(parse_hhmm("25:00").is_none());
        assert!(parse_hhmm("").is_none());
    }

    #[test]
    fn test_fmt_hhmm_round_trip() {
        assert_eq!(fmt_hhmm(t("09:00")), "09:00");
        assert_eq!(fmt_hhmm(t("23:30")), "23:30");
    }

    #[test]
    fn test_normalize_times_sorts_and_dedupes() {
        let got = normalize_times(vec![t("10:30"), t("09:00"), t("10:30"), t("09:30")]);
        assert_eq!(got, vec![t("09:00"), t("09:30"), t("10:30")]);
    }

    #[test]
    fn test_normalize_times_empty() {
        assert!(normalize_times(vec![]).is_empty());
    }

    #[test]
    fn test_expand_template_half_hour_steps() {
        let got = expand_template(t("09:00"), t("11:00"));
        assert_eq!(got, vec![t("09:00"), t("09:30"), t("10:00"), t("10:30")]);
    }

    #[test]
    fn test_expand_template_end_exclusive() {
        let got = expand_template(t("09:00"), t("09:30"));
        assert_eq!(got, vec![t("09:00")]);
    }

    #[test]
    fn test_expand_template_empty_range() {
        assert!(expand_template(t("11:00"), t("09:00")).is_empty());
        assert!(expand_template(t("09:00"), t("09:00")).is_empty());
    }

    #[test]
    fn test_expanded_times_are_ascending() {
        let got = expand_template(t("08:00"), t("17:00"));
        assert!(got.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_open_times_excludes_booked() {
        let expanded = expand_template(t("09:00"), t("11:00"));
        let booked = vec![t("09:30"), t("10:30")];
        assert_eq!(open_times(expanded, &booked), vec![t("09:00"), t("10:00")]);
    }

    #[test]
    fn test_open_times_with_nothing_booked() {
        let expanded = expand_template(t("09:00"), t("10:00"));
        assert_eq!(open_times(expanded.clone(), &[]), expanded);
    }
}
