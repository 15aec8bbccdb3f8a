use crate::state::AppState;
use axum::Router;

pub(crate) mod claims;
pub mod dto;
pub mod handlers;
pub mod jwt;
pub mod otp;
mod password;
pub mod repo;
pub mod repo_types;
pub(crate) mod validate;

pub fn router() -> Router<AppState> {
    Router::new().merge(handlers::auth_routes())
}
