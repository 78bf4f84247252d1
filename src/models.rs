use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::Row;
use uuid::Uuid;

use crate::error::ApiError;
use crate::notify::NotificationDispatch;

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub notifier: Arc<dyn NotificationDispatch>,
}

/* -------------------------
   API envelopes
--------------------------*/

#[derive(Debug, Serialize)]
pub struct ApiOk<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiOk<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/* -------------------------
   Domain enums (stored as smallint)
--------------------------*/

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "smallint")]
#[repr(i16)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled = 0,
    Confirmed = 1,
    InProgress = 2,
    Completed = 3,
    Cancelled = 4,
    NoShow = 5,
}

impl AppointmentStatus {
    pub fn from_str_name(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(Self::Scheduled),
            "confirmed" => Some(Self::Confirmed),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            "no_show" => Some(Self::NoShow),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Confirmed => "confirmed",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::NoShow => "no_show",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "smallint")]
#[repr(i16)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentType {
    Consultation = 0,
    FollowUp = 1,
    Emergency = 2,
    Telehealth = 3,
}

impl AppointmentType {
    pub fn from_str_name(s: &str) -> Option<Self> {
        match s {
            "consultation" => Some(Self::Consultation),
            "follow_up" => Some(Self::FollowUp),
            "emergency" => Some(Self::Emergency),
            "telehealth" => Some(Self::Telehealth),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "smallint")]
#[repr(i16)]
#[serde(rename_all = "snake_case")]
pub enum AssistanceStatus {
    Pending = 0,
    Approved = 1,
    InProgress = 2,
    Completed = 3,
    Rejected = 4,
}

impl AssistanceStatus {
    pub fn from_str_name(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "smallint")]
#[repr(i16)]
#[serde(rename_all = "snake_case")]
pub enum UrgencyLevel {
    Low = 0,
    Medium = 1,
    High = 2,
    Critical = 3,
}

impl UrgencyLevel {
    pub fn from_str_name(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "smallint")]
#[repr(i16)]
#[serde(rename_all = "snake_case")]
pub enum DonationStatus {
    Pending = 0,
    Completed = 1,
    Failed = 2,
}

/* -------------------------
   DB Row Models
--------------------------*/

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DoctorSlotRow {
    pub doctor_id: Uuid,
    pub slot_date: NaiveDate,
    pub times: Vec<NaiveTime>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AppointmentRow {
    pub appointment_id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub appointment_type: AppointmentType,
    pub scheduled_time: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub patient_notes: Option<String>,
    pub doctor_notes: Option<String>,
    pub prescriptions: Vec<String>,
    pub tests_ordered: Vec<String>,
    pub exam_start_time: Option<DateTime<Utc>>,
    pub exam_end_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AssistanceRow {
    pub assistance_id: Uuid,
    pub patient_id: Uuid,
    pub request_type: String,
    pub title: String,
    pub description: String,
    pub medical_condition: String,
    pub requested_amount: i64,
    pub urgency: UrgencyLevel,
    pub raised_amount: i64,
    pub withdrawn_amount: i64,
    pub remaining_amount: i64,
    pub status: AssistanceStatus,
    pub approved_by: Option<Uuid>,
    pub support_start_date: NaiveDate,
    pub support_end_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct WithdrawalRow {
    pub withdrawal_id: Uuid,
    pub assistance_id: Uuid,
    pub amount: i64,
    pub admin_id: Uuid,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DonationRow {
    pub donation_id: Uuid,
    pub user_id: Option<Uuid>,
    pub assistance_id: Uuid,
    pub amount: i64,
    pub payment_method: String,
    pub status: DonationStatus,
    pub is_anonymous: bool,
    pub donor_name: Option<String>,
    pub donor_email: Option<String>,
    pub donor_phone: Option<String>,
    pub gateway_ref: String,
    pub created_at: DateTime<Utc>,
}

/* -------------------------
   Helpers
--------------------------*/

/// Role mapping:
/// 0 Patient, 1 Doctor, 2 Admin, 3 CharityAdmin
pub fn role_to_string(role: i16) -> String {
    match role {
        0 => "patient",
        1 => "doctor",
        2 => "admin",
        3 => "charity_admin",
        _ => "unknown",
    }
    .to_string()
}

/// Resolve the calling user to their patient profile id.
pub async fn resolve_patient_id_by_user_id(
    db: &sqlx::PgPool,
    user_id: Uuid,
) -> Result<Uuid, ApiError> {
    let row = sqlx::query(
        r#"
        SELECT patient_id
        FROM patient
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(db)
    .await
    .map_err(ApiError::db)?;

    let Some(row) = row else {
        return Err(ApiError::BadRequest(
            "NO_PATIENT_PROFILE",
            "Account has no patient profile".into(),
        ));
    };

    row.try_get("patient_id")
        .map_err(|e| ApiError::Internal(format!("row decode error: {e}")))
}

/// Resolve the calling user to their doctor profile id.
pub async fn resolve_doctor_id_by_user_id(
    db: &sqlx::PgPool,
    user_id: Uuid,
) -> Result<Uuid, ApiError> {
    let row = sqlx::query(
        r#"
        SELECT doctor_id
        FROM doctor
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(db)
    .await
    .map_err(ApiError::db)?;

    let Some(row) = row else {
        return Err(ApiError::BadRequest(
            "NO_DOCTOR_PROFILE",
            "Account has no doctor profile".into(),
        ));
    };

    row.try_get("doctor_id")
        .map_err(|e| ApiError::Internal(format!("row decode error: {e}")))
}
