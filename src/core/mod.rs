pub mod alignment;
pub mod player;
pub mod protocol;
pub mod session;
pub mod text;
pub mod timeline;
pub mod tts;
