mod dto;
pub mod handlers;
pub mod ledger;
pub mod repo;
pub mod repo_types;
pub mod services;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::plan_routes())
        .merge(handlers::checkout_routes())
        .merge(handlers::admin_routes())
}
