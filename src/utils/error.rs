use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Fetch error: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("Element not found: {selector}")]
    ElementNotFound { selector: String },

    #[error("Parsing error: {message}")]
    Parse { message: String },

    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("Email message error: {0}")]
    Email(#[from] lettre::error::Error),

    #[error("Email address error: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Watchlist error: {0}")]
    Watchlist(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;
