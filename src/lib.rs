pub mod config;
pub mod errors;
pub mod exec;
pub mod geo;
pub mod logger;
pub mod query;
pub mod repository;
pub mod schema;
pub mod utils;

pub use config::RepositoryConfig;
pub use errors::{DbError, Result};
pub use repository::Repository;

/// Initializes logging from `NEXUSREPO_*` environment variables.
///
/// Call once at startup, before registering repository methods.
///
/// # Errors
/// Returns an error if a log directory cannot be created or an appender fails to build.
pub fn init() -> std::result::Result<(), Box<dyn std::error::Error>> {
    logger::configure_from_env()?;
    Ok(())
}
