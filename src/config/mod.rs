/// Application settings loaded from config.toml
pub mod app;

/// Database connection and table creation
pub mod database;

pub use app::{AppConfig, ConnectivitySettings, DatabaseSettings, RemoteSettings, load_config};
