pub mod config;
pub mod document;
pub mod error;
pub mod types;

pub use config::DwhConfig;
pub use document::ConfigDocument;
pub use error::{ConfigError, ConfigResult};
pub use types::*;
