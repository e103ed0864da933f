mod dto;
pub mod handlers;
pub mod lifecycle;
pub mod repo;
pub mod repo_types;
pub(crate) mod services;
pub mod status;

use crate::state::AppState;
use axum::Router;

pub use dto::{Pagination, UploadUrlRequest, UploadUrlResponse};

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::read_routes())
        .merge(handlers::write_routes())
}
