// Re-export needed modules for the binary and tests
pub mod api;
pub mod chat;
pub mod directory;
pub mod error;
pub mod models;
pub mod session;
pub mod tutors;

// Re-export main types for convenience
pub use api::ApiClient;
pub use chat::ChatStore;
pub use models::*;
