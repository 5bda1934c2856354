pub mod config;
pub mod dispatch;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod resolver;
