pub mod config;
pub mod error;
pub mod models;
pub mod service;
pub mod session;

pub use config::ServiceConfig;
pub use error::ApiError;
pub use models::DocumentHandle;
pub use service::LedgerService;
