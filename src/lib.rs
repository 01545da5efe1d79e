pub mod config;
pub mod extractor;
pub mod fetcher;
pub mod notifier;
pub mod registry;
pub mod tracker;
pub mod utils;

// Re-export commonly used types
pub use config::AppConfig;
pub use utils::error::AppError;

pub type Result<T> = std::result::Result<T, AppError>;
