// Funding ledger arithmetic. All amounts are smallest-currency-unit
// integers; remaining_amount is derived and recomputed in the same
// statement as every raised_amount change.

use sqlx::{PgConnection, Row};
use uuid::Uuid;

use crate::error::ApiError;

/// Floor for a new assistance request's target amount.
pub const MIN_REQUESTED_AMOUNT: i64 = 100_000;

/* ============================================================
   Pure guards
   ============================================================ */

pub fn remaining_amount(requested: i64, raised: i64) -> i64 {
    (requested - raised).max(0)
}

pub fn validate_requested_amount(amount: i64) -> Result<(), ApiError> {
    if amount < MIN_REQUESTED_AMOUNT {
        return Err(ApiError::invalid_amount(format!(
            "requested_amount must be at least {MIN_REQUESTED_AMOUNT}"
        )));
    }
    Ok(())
}

/// Fast-fail check against the last-read balances. The persistent update
/// re-checks the same condition atomically, so a stale read here can only
/// produce a clean INSUFFICIENT_FUNDS, never an over-withdrawal.
pub fn validate_withdrawal(amount: i64, raised: i64, withdrawn: i64) -> Result<(), ApiError> {
    if amount <= 0 {
        return Err(ApiError::invalid_amount("amount must be positive"));
    }
    let available = raised - withdrawn;
    if amount > available {
        return Err(ApiError::insufficient_funds());
    }
    Ok(())
}

pub fn validate_donation_amount(amount: i64) -> Result<(), ApiError> {
    if amount <= 0 {
        return Err(ApiError::invalid_amount("amount must be positive"));
    }
    Ok(())
}

/* ============================================================
   Atomic balance updates
   ============================================================ */

#[derive(Debug, Clone, Copy)]
pub struct Balances {
    pub raised_amount: i64,
    pub withdrawn_amount: i64,
    pub remaining_amount: i64,
}

fn decode_balances(row: &sqlx::postgres::PgRow) -> Result<Balances, ApiError> {
    let err = |e: sqlx::Error| ApiError::Internal(format!("row decode error: {e}"));
    Ok(Balances {
        raised_amount: row.try_get("raised_amount").map_err(err)?,
        withdrawn_amount: row.try_get("withdrawn_amount").map_err(err)?,
        remaining_amount: row.try_get("remaining_amount").map_err(err)?,
    })
}

/// Credit a confirmed donation. raised_amount and the derived
/// remaining_amount move together in one statement.
pub async fn credit_raised(
    conn: &mut PgConnection,
    assistance_id: Uuid,
    amount: i64,
) -> Result<Balances, ApiError> {
    let row = sqlx::query(
        r#"
        UPDATE assistance_request
        SET raised_amount    = raised_amount + $2,
            remaining_amount = GREATEST(0, requested_amount - (raised_amount + $2)),
            updated_at = now()
        WHERE assistance_id = $1
        RETURNING raised_amount, withdrawn_amount, remaining_amount
        "#,
    )
    .bind(assistance_id)
    .bind(amount)
    .fetch_optional(&mut *conn)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(|| ApiError::not_found("assistance request"))?;

    decode_balances(&row)
}

/// Apply a withdrawal only if the result stays within raised funds.
/// Zero rows with an existing request means a concurrent withdrawal beat
/// us to the balance: report INSUFFICIENT_FUNDS.
pub async fn apply_withdrawal(
    conn: &mut PgConnection,
    assistance_id: Uuid,
    amount: i64,
) -> Result<Balances, ApiError> {
    let row = sqlx::query(
        r#"
        UPDATE assistance_request
        SET withdrawn_amount = withdrawn_amount + $2,
            updated_at = now()
        WHERE assistance_id = $1
          AND withdrawn_amount + $2 <= raised_amount
        RETURNING raised_amount, withdrawn_amount, remaining_amount
        "#,
    )
    .bind(assistance_id)
    .bind(amount)
    .fetch_optional(&mut *conn)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(ApiError::insufficient_funds)?;

    decode_balances(&row)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remaining_amount() {
        assert_eq!(remaining_amount(10_000_000, 6_000_000), 4_000_000);
        assert_eq!(remaining_amount(10_000_000, 0), 10_000_000);
        // over-funded requests clamp at zero
        assert_eq!(remaining_amount(10_000_000, 12_000_000), 0);
    }

    #[test]
    fn test_requested_amount_floor() {
        assert!(validate_requested_amount(100_000).is_ok());
        assert!(validate_requested_amount(10_000_000).is_ok());
        assert!(validate_requested_amount(99_999).is_err());
        assert!(validate_requested_amount(0).is_err());
    }

    #[test]
    fn test_withdrawal_rejects_non_positive() {
        assert!(validate_withdrawal(0, 6_000_000, 0).is_err());
        assert!(validate_withdrawal(-1, 6_000_000, 0).is_err());
    }

    #[test]
    fn test_withdrawal_against_available_balance() {
        // raised 6,000,000, nothing withdrawn yet
        assert!(validate_withdrawal(7_000_000, 6_000_000, 0).is_err());
        assert!(validate_withdrawal(6_000_001, 6_000_000, 0).is_err());
        assert!(validate_withdrawal(6_000_000, 6_000_000, 0).is_ok());
        assert!(validate_withdrawal(5_000_000, 6_000_000, 0).is_ok());
    }

    #[test]
    fn test_withdrawal_counts_prior_withdrawals() {
        assert!(validate_withdrawal(2_000_000, 6_000_000, 5_000_000).is_err());
        assert!(validate_withdrawal(1_000_000, 6_000_000, 5_000_000).is_ok());
        assert!(validate_withdrawal(1, 6_000_000, 6_000_000).is_err());
    }

    #[test]
    fn test_donation_amount_guard() {
        assert!(validate_donation_amount(1).is_ok());
        assert!(validate_donation_amount(0).is_err());
        assert!(validate_donation_amount(-500).is_err());
    }
}
