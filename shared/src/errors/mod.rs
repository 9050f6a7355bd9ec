mod channel_errors;
mod config_errors;
mod embed_errors;
mod hook_errors;
mod injection_errors;

pub use channel_errors::ChannelError;
pub use config_errors::ConfigError;
pub use embed_errors::{EmbedError, WindowRole};
pub use hook_errors::HookError;
pub use injection_errors::InjectError;
