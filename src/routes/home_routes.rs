use axum::{Json, Router, extract::State, routing::get};

use crate::error::ApiError;
use crate::middleware::auth_context::AuthContext;
use crate::models::{role_to_string, AppState};

#[derive(serde::Serialize)]
pub struct HomeResponse {
    pub success: bool,
    pub data: HomeData,
}

#[derive(serde::Serialize)]
pub struct HomeData {
    pub view: String,
    pub message: String,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/home", get(home))
}

pub async fn home(
    State(_state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<HomeResponse>, ApiError> {
    // DB stores a single role (smallint):
    // 0 patient, 1 doctor, 2 admin, 3 charity_admin
    Ok(Json(HomeResponse {
        success: true,
        data: HomeData {
            view: role_to_string(auth.role),
            message: "placeholder home payload (role-based)".to_string(),
        },
    }))
}
