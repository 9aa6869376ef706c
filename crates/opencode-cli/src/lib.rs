pub mod commands;
pub mod config;

pub use commands::{run, Command};
pub use config::{Config, LoggingConfig};
