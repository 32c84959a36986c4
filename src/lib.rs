pub mod config;
pub mod core;
pub mod errors;
pub mod handlers;
pub mod routes;
pub mod state;

// Re-export commonly used items for convenience
pub use crate::core::player::{BufferPlayer, PlaybackError, PlayerState};
pub use crate::core::session::{PlaybackManager, SpeechOptions};
pub use crate::core::tts::ProviderKind;
pub use config::ServerConfig;
pub use errors::app_error::{AppError, AppResult};
pub use state::AppState;
