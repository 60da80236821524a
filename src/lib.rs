pub mod config;
pub mod models;
pub mod ocr;
pub mod offer_update;
pub mod plugins;
pub mod repository;
pub mod scheduler;
pub mod utils;
pub mod web_scraper;
pub mod worker;

// Re-export commonly used types
pub use config::AppConfig;
pub use offer_update::{CycleReport, OfferUpdate, RefreshCycle};
pub use utils::error::AppError;
pub use worker::{OfferUpdateWorker, RefreshOutcome};

pub type Result<T> = std::result::Result<T, AppError>;
