pub mod config;
pub mod logging;
pub mod models;

pub use config::Config;
