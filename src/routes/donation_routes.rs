// src/routes/donation_routes.rs
//
// Donations and the payment-gateway confirmation callback. The gateway
// reference is the idempotency key: a duplicate callback can never credit
// a request twice.

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::Row;
use uuid::Uuid;

use crate::{
    error::ApiError,
    funding,
    middleware::auth_context::AuthContext,
    models::{ApiOk, AppState, DonationRow},
    notify::notify_best_effort,
};

// roles: 0 patient, 1 doctor, 2 admin, 3 charity_admin

fn is_funding_staff(auth: &AuthContext) -> bool {
    auth.role == 2 || auth.role == 3
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/donations", get(list_donations).post(create_donation))
        .route("/donations/confirm", post(confirm_donation))
}

const DONATION_COLUMNS: &str = r#"
    donation_id, user_id, assistance_id, amount, payment_method, status,
    is_anonymous, donor_name, donor_email, donor_phone, gateway_ref,
    created_at
"#;

/* ============================================================
   POST /donations (pending, no balance effect)
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct CreateDonationRequest {
    pub assistance_id: Uuid,
    pub amount: i64,
    pub payment_method: String,
    pub gateway_ref: String,
    pub is_anonymous: Option<bool>,
    pub donor_name: Option<String>,
    pub donor_email: Option<String>,
    pub donor_phone: Option<String>,
}

pub async fn create_donation(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateDonationRequest>,
) -> Result<Json<ApiOk<DonationRow>>, ApiError> {
    funding::validate_donation_amount(req.amount)?;
    if req.payment_method.trim().is_empty() {
        return Err(ApiError::validation("payment_method is required"));
    }
    if req.gateway_ref.trim().is_empty() {
        return Err(ApiError::validation("gateway_ref is required"));
    }

    let exists = sqlx::query(r#"SELECT 1 FROM assistance_request WHERE assistance_id = $1"#)
        .bind(req.assistance_id)
        .fetch_optional(&state.db)
        .await
        .map_err(ApiError::db)?;
    if exists.is_none() {
        return Err(ApiError::not_found("assistance request"));
    }

    // Unique gateway_ref: a duplicate submit returns the existing record
    // instead of a second pending donation.
    let inserted = sqlx::query_as::<_, DonationRow>(&format!(
        r#"
        INSERT INTO donation (
            user_id, assistance_id, amount, payment_method, status,
            is_anonymous, donor_name, donor_email, donor_phone, gateway_ref
        )
        VALUES ($1, $2, $3, $4, 0, $5, $6, $7, $8, $9)
        ON CONFLICT (gateway_ref) DO NOTHING
        RETURNING {DONATION_COLUMNS}
        "#
    ))
    .bind(auth.user_id)
    .bind(req.assistance_id)
    .bind(req.amount)
    .bind(req.payment_method.trim())
    .bind(req.is_anonymous.unwrap_or(false))
    .bind(req.donor_name)
    .bind(req.donor_email)
    .bind(req.donor_phone)
    .bind(req.gateway_ref.trim())
    .fetch_optional(&state.db)
    .await
    .map_err(|e| ApiError::BadRequest("DONATION_CREATE_FAILED", format!("{e}")))?;

    let donation = match inserted {
        Some(d) => d,
        None => fetch_by_gateway_ref(&state.db, req.gateway_ref.trim())
            .await?
            .ok_or_else(|| ApiError::not_found("donation"))?,
    };

    Ok(Json(ApiOk::new(donation)))
}

/* ============================================================
   POST /donations/confirm (gateway callback)
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct ConfirmDonationRequest {
    pub assistance_id: Uuid,
    pub amount: i64,
    pub gateway_ref: String,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct ConfirmDonationResponse {
    pub donation: Option<DonationRow>,
    pub credited: bool,
}

fn gateway_status_is_success(status: &str) -> bool {
    matches!(status.trim(), "completed" | "success")
}

#[derive(Debug)]
enum Settlement {
    /// The conditional write touched a row; this callback credits it.
    Credit(DonationRow),
    /// The reference is already settled: duplicate callback, no credit.
    Duplicate(DonationRow),
    /// No row holds the reference yet.
    Unrecorded,
}

/// Classify a success callback after a conditional write attempt. `written`
/// is what the guarded UPDATE/INSERT returned; `existing` is the row found
/// by gateway_ref when the write touched nothing. A given reference can
/// classify as Credit at most once across retries.
fn classify_settlement(
    written: Option<DonationRow>,
    existing: Option<DonationRow>,
) -> Settlement {
    match (written, existing) {
        (Some(d), _) => Settlement::Credit(d),
        (None, Some(d)) => Settlement::Duplicate(d),
        (None, None) => Settlement::Unrecorded,
    }
}

/// No AuthContext here: the callback comes from the payment gateway, and
/// signature verification is that integration's responsibility upstream.
pub async fn confirm_donation(
    State(state): State<AppState>,
    Json(req): Json<ConfirmDonationRequest>,
) -> Result<Json<ApiOk<ConfirmDonationResponse>>, ApiError> {
    if req.gateway_ref.trim().is_empty() {
        return Err(ApiError::validation("gateway_ref is required"));
    }
    let gateway_ref = req.gateway_ref.trim();

    if !gateway_status_is_success(&req.status) {
        // A failed attempt settles the pending record; nothing is credited.
        let donation = sqlx::query_as::<_, DonationRow>(&format!(
            r#"
            UPDATE donation
            SET status = 2
            WHERE gateway_ref = $1 AND status = 0
            RETURNING {DONATION_COLUMNS}
            "#
        ))
        .bind(gateway_ref)
        .fetch_optional(&state.db)
        .await
        .map_err(ApiError::db)?;

        return Ok(Json(ApiOk::new(ConfirmDonationResponse {
            donation,
            credited: false,
        })));
    }

    funding::validate_donation_amount(req.amount)?;

    let mut tx = state.db.begin().await.map_err(ApiError::db)?;

    // Path 1: a pending donation holds this reference; flip it. The
    // status guard in the WHERE clause is what makes retries harmless.
    let flipped = sqlx::query_as::<_, DonationRow>(&format!(
        r#"
        UPDATE donation
        SET status = 1,
            amount = $2
        WHERE gateway_ref = $1 AND status = 0
        RETURNING {DONATION_COLUMNS}
        "#
    ))
    .bind(gateway_ref)
    .bind(req.amount)
    .fetch_optional(&mut *tx)
    .await
    .map_err(ApiError::db)?;

    let existing = match &flipped {
        Some(_) => None,
        None => fetch_by_gateway_ref_tx(&mut tx, gateway_ref).await?,
    };

    let (donation, credited) = match classify_settlement(flipped, existing) {
        Settlement::Credit(d) => {
            funding::credit_raised(&mut *tx, d.assistance_id, d.amount).await?;
            (d, true)
        }
        // Path 2: duplicate callback, success with no second credit.
        Settlement::Duplicate(d) => (d, false),
        Settlement::Unrecorded => {
            // Path 3: donation made entirely at the gateway; record it as
            // completed. The unique index settles a callback race.
            let exists =
                sqlx::query(r#"SELECT 1 FROM assistance_request WHERE assistance_id = $1"#)
                    .bind(req.assistance_id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(ApiError::db)?;
            if exists.is_none() {
                return Err(ApiError::not_found("assistance request"));
            }

            let inserted = sqlx::query_as::<_, DonationRow>(&format!(
                r#"
                INSERT INTO donation (
                    user_id, assistance_id, amount, payment_method, status,
                    is_anonymous, gateway_ref
                )
                VALUES (NULL, $1, $2, 'gateway', 1, true, $3)
                ON CONFLICT (gateway_ref) DO NOTHING
                RETURNING {DONATION_COLUMNS}
                "#
            ))
            .bind(req.assistance_id)
            .bind(req.amount)
            .bind(gateway_ref)
            .fetch_optional(&mut *tx)
            .await
            .map_err(ApiError::db)?;

            let existing = match &inserted {
                Some(_) => None,
                None => fetch_by_gateway_ref_tx(&mut tx, gateway_ref).await?,
            };

            match classify_settlement(inserted, existing) {
                Settlement::Credit(d) => {
                    funding::credit_raised(&mut *tx, d.assistance_id, d.amount).await?;
                    (d, true)
                }
                Settlement::Duplicate(d) => (d, false),
                Settlement::Unrecorded => return Err(ApiError::not_found("donation")),
            }
        }
    };

    tx.commit().await.map_err(ApiError::db)?;

    if credited {
        if let Some(uid) = owner_user_id(&state.db, donation.assistance_id).await {
            notify_best_effort(
                state.notifier.clone(),
                Some(uid),
                "donation_received",
                json!({
                    "assistance_id": donation.assistance_id,
                    "amount": donation.amount,
                }),
            );
        }
    }

    Ok(Json(ApiOk::new(ConfirmDonationResponse {
        donation: Some(donation),
        credited,
    })))
}

/* ============================================================
   GET /donations (staff)
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub assistance_id: Option<Uuid>,
}

pub async fn list_donations(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(q): Query<ListQuery>,
) -> Result<Json<ApiOk<Vec<DonationRow>>>, ApiError> {
    if !is_funding_staff(&auth) {
        return Err(ApiError::forbidden(
            "Only admin/charity_admin can list donations",
        ));
    }

    let rows = sqlx::query_as::<_, DonationRow>(&format!(
        r#"
        SELECT {DONATION_COLUMNS}
        FROM donation
        WHERE ($1::uuid IS NULL OR assistance_id = $1)
        ORDER BY created_at DESC
        "#
    ))
    .bind(q.assistance_id)
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(ApiOk::new(rows)))
}

/* ============================================================
   Helpers
   ============================================================ */

async fn fetch_by_gateway_ref(
    db: &sqlx::PgPool,
    gateway_ref: &str,
) -> Result<Option<DonationRow>, ApiError> {
    sqlx::query_as::<_, DonationRow>(&format!(
        r#"
        SELECT {DONATION_COLUMNS}
        FROM donation
        WHERE gateway_ref = $1
        "#
    ))
    .bind(gateway_ref)
    .fetch_optional(db)
    .await
    .map_err(ApiError::db)
}

async fn fetch_by_gateway_ref_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    gateway_ref: &str,
) -> Result<Option<DonationRow>, ApiError> {
    sqlx::query_as::<_, DonationRow>(&format!(
        r#"
        SELECT {DONATION_COLUMNS}
        FROM donation
        WHERE gateway_ref = $1
        "#
    ))
    .bind(gateway_ref)
    .fetch_optional(&mut **tx)
    .await
    .map_err(ApiError::db)
}

async fn owner_user_id(db: &sqlx::PgPool, assistance_id: Uuid) -> Option<Uuid> {
    let row = sqlx::query(
        r#"
        SELECT p.user_id
        FROM assistance_request ar
        JOIN patient p ON p.patient_id = ar.patient_id
        WHERE ar.assistance_id = $1
        "#,
    )
    .bind(assistance_id)
    .fetch_optional(db)
    .await
    .ok()??;
    row.try_get("user_id").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DonationStatus;
    use chrono::Utc;

    fn donation(status: DonationStatus) -> DonationRow {
        DonationRow {
            donation_id: Uuid::new_v4(),
            user_id: None,
            assistance_id: Uuid::new_v4(),
            amount: 500_000,
            payment_method: "gateway".into(),
            status,
            is_anonymous: true,
            donor_name: None,
            donor_email: None,
            donor_phone: None,
            gateway_ref: "ref-1".into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_touched_row_credits() {
        let flipped = donation(DonationStatus::Completed);
        assert!(matches!(
            classify_settlement(Some(flipped), None),
            Settlement::Credit(_)
        ));
    }

    #[test]
    fn test_duplicate_reference_never_credits_twice() {
        // guarded write touched nothing, the reference is already settled
        let settled = donation(DonationStatus::Completed);
        let got = classify_settlement(None, Some(settled.clone()));
        match got {
            Settlement::Duplicate(d) => assert_eq!(d.donation_id, settled.donation_id),
            other => panic!("expected Duplicate, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_reference_is_unrecorded() {
        assert!(matches!(
            classify_settlement(None, None),
            Settlement::Unrecorded
        ));
    }

    #[test]
    fn test_insert_race_loser_settles_without_credit() {
        // ON CONFLICT DO NOTHING returned no row; the winner's row exists
        let winner = donation(DonationStatus::Completed);
        assert!(matches!(
            classify_settlement(None, Some(winner)),
            Settlement::Duplicate(_)
        ));
    }

    #[test]
    fn test_gateway_status_mapping() {
        assert!(gateway_status_is_success("completed"));
        assert!(gateway_status_is_success("success"));
        assert!(gateway_status_is_success(" completed "));
        assert!(!gateway_status_is_success("failed"));
        assert!(!gateway_status_is_success("pending"));
        assert!(!gateway_status_is_success(""));
    }
}
