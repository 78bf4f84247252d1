use crate::models::AppState;
use axum::Router;

pub mod appointment_routes;
pub mod assistance_routes;
pub mod donation_routes;
pub mod home_routes;
pub mod slot_routes;

pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", slot_routes::router())
        .nest("/api/v1", appointment_routes::router())
        .nest("/api/v1", assistance_routes::router())
        .nest("/api/v1", donation_routes::router())
        .merge(home_routes::router())
        .with_state(state)
}
