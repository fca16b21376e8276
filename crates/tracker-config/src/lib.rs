pub mod config;
pub mod error;
pub mod repository;
pub mod utils;

#[cfg(test)]
pub mod test_utils;

pub use config::{default_config_path, Config};
pub use error::{ConfigError, Result};
pub use repository::Repository;
