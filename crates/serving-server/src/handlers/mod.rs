//! HTTP request handlers for API endpoints.

pub mod generate;
pub mod health;
pub mod models;
pub mod sessions;

pub use generate::handle_generate;
pub use health::handle_health;
pub use models::handle_list_models;
pub use sessions::{handle_cancel_session, handle_session_status};
