use thiserror::Error;

use crate::models::ProviderId;
use crate::ocr::OcrError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("OCR error: {0}")]
    Ocr(#[from] OcrError),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] tokio_cron_scheduler::JobSchedulerError),

    #[error("Parsing error: {message}")]
    Parse { message: String },

    #[error("Resolver error: {provider}: {message}")]
    Resolver { provider: ProviderId, message: String },

    #[error("No resolver registered for provider {0}")]
    NoResolver(ProviderId),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(format!("{}", err))
    }
}

impl From<url::ParseError> for AppError {
    fn from(err: url::ParseError) -> Self {
        AppError::Parse {
            message: format!("invalid URL: {}", err),
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
