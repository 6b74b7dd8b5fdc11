// Core modules
pub mod backtest;
pub mod config;
pub mod data;
pub mod db;
pub mod engine;
pub mod execution;
pub mod indicators;
pub mod models;
pub mod oracle;
pub mod persistence;
pub mod reconcile;
pub mod risk;
pub mod strategy;

// Re-export commonly used types
pub use models::*;
pub use strategy::SignalFilter;

// Error handling
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
