pub mod history;
pub mod prompt;

pub use history::{ChatHistoryStore, ChatMessage};
