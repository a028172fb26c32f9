pub mod chat;
pub mod health;
pub mod page;

// Re-export all handlers for easy route registration
pub use chat::chat_handler;
pub use health::{health_handler, metrics_handler};
pub use page::index_handler;
