pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod observability;
pub mod server;
pub mod state;

pub use auth::{AuthState, OwnerAuth, OwnerClaims, OwnerContext};
pub use config::{AppConfig, StorageBackend};
pub use error::ApiError;
pub use observability::init_tracing;
pub use server::{ServerBuilder, SubsyncServer, build_app};
pub use state::AppState;
