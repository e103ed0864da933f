pub(crate) mod claims;
pub(crate) mod extractors;

pub use extractors::{ActingUser, AuthUser};
pub(crate) use extractors::require_admin;
