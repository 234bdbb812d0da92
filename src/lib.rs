pub mod api;
pub mod config;
pub mod error;
pub mod session;
pub mod state;
pub mod tracking;

#[cfg(test)]
pub(crate) mod testing;

pub use config::Config;
pub use error::{AppError, ErrorPresentation};
pub use session::{Session, SessionStore};
pub use state::AppState;
