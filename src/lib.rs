// RepairHub - community repair sharing data core

// Record store - pluggable persistence with auth and object storage
pub mod store;

// Domain layer - hub operations, comment threading, social toggles
pub mod hub;
pub mod thread;
pub mod toggle;

// Client-side working set
pub mod session;

// HTTP surface
pub mod http;

// Application wiring
pub mod app_state;
pub mod config;
pub mod seed;

// Common utilities
pub mod cache;
pub mod error;
pub mod models;

// Re-exports for convenience
pub use error::{AppError, AppResult};
pub use hub::Hub;
pub use session::Session;
