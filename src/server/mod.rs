mod auth;
mod catalog_routes;
mod error;
mod language;
mod recommend_routes;
mod search_routes;
mod server;
mod state;
mod user_routes;

pub use auth::{AuthUser, LocalTokenVerifier, Session, TokenVerifier};
pub use error::ApiError;
pub use language::UserLanguageCache;
pub use server::{make_app, make_state, run_server, SERVICE_NAME};
pub use state::AppState;
