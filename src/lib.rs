//! HB Fetcher Library
//!
//! Lists the orders of a Humble Bundle account and downloads their files with
//! resumable, checksum-verified transfers, a persistent hash index and a
//! bounded pool of concurrent workers.

pub mod app;
pub mod cli;
pub mod config;
pub mod constants;
pub mod errors;
pub mod prelude;

// Re-export commonly used types for convenience
pub use errors::{AppError, Result};

#[cfg(test)]
mod tests {
    use super::*;
    use constants::*;

    #[test]
    fn test_constants_accessible() {
        assert_eq!(DEFAULT_WORKER_COUNT, 4);
        assert_eq!(env::SESSION_COOKIE, "HB_SESSION_COOKIE");
        assert!(USER_AGENT.starts_with("hb_fetcher/"));
    }

    #[test]
    fn test_error_types() {
        let app_error = AppError::Auth(errors::AuthError::Invalid);

        assert_eq!(app_error.category(), "authentication");
        assert!(!app_error.is_recoverable());
    }
}
