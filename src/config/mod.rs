/// Database configuration and connection management
pub mod database;

/// School and tuition policy loading from config.toml
pub mod school;
