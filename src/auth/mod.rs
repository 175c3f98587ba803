use crate::state::AppState;
use axum::Router;

pub mod claims;
pub mod dto;
pub(crate) mod extractors;
pub mod handlers;
pub mod jwt;
pub mod password;
pub mod repo;
pub mod repo_types;
pub mod reset_token;
pub mod services;
#[cfg(test)]
pub(crate) mod testing;

pub fn router() -> Router<AppState> {
    Router::new().nest(
        "/api/auth",
        Router::new()
            .merge(handlers::auth_routes())
            .merge(handlers::me_routes()),
    )
}
