//! Error types for credential handling

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid credentials for user '{0}': expected user:password")]
    InvalidUser(String),
}

pub type Result<T> = std::result::Result<T, AuthError>;
