//! Shared library for the AirCRM service
//!
//! This library contains the cross-cutting pieces used by the web service:
//! - Error taxonomy and HTTP error envelopes
//! - Environment-driven configuration
//! - Token issuing/validation and password hashing
//! - Common pagination types

pub mod auth;
pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use auth::{AuthService, Claims, Role};
pub use config::Config;
pub use error::{AppError, ErrorCode, FieldErrors, Result};
pub use types::*;
