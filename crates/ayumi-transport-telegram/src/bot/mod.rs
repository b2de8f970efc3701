/// Username to user resolution cache
pub mod directory;
/// Command message and button press handlers
pub mod handlers;
/// Resilient messaging with automatic retry for Telegram API operations
pub mod resilient;
/// Reply sink implementation over the Bot API
pub mod sink;
/// View layer for UI components (pagination keyboards)
pub mod views;

pub use directory::UserDirectory;
pub use sink::TelegramSink;
