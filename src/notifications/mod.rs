pub mod handlers;
pub mod notifier;
pub mod repo;
pub(crate) mod services;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::notification_routes())
        .merge(handlers::admin_routes())
}
