//! Speech synthesis backends
//!
//! Two interchangeable backends sit behind the [`SpeechBackend`] capability
//! interface: a character-timestamp backend (`charalign`) and a word-boundary
//! backend (`wordmark`). Selection is a data-driven switch over
//! [`ProviderKind`]; the relay never needs to know which vendor it is
//! talking to.

pub mod base;
pub mod charalign;
pub mod enhance;
pub mod wordmark;

pub use base::{
    BoxedBackend, CharAlignment, ProviderKind, SpeechBackend, SynthesisError, SynthesisEvent,
    SynthesisResult, VoiceSpec,
};
pub use charalign::CharAlignBackend;
pub use enhance::{EnhancedText, MarkupEnhancer, PositionMap, fallback_markup};
pub use wordmark::WordBoundaryBackend;

use crate::config::ServerConfig;

/// Create a backend instance for the given provider kind
///
/// # Errors
/// Returns `SynthesisError::InvalidConfiguration` when the configuration is
/// missing what the backend needs (API key, region).
pub fn create_backend(
    kind: ProviderKind,
    config: &ServerConfig,
) -> SynthesisResult<BoxedBackend> {
    match kind {
        ProviderKind::Charalign => {
            let backend = CharAlignBackend::new(
                config.charalign_api_key.clone().unwrap_or_default(),
                config.charalign_url.clone(),
            )?;
            Ok(std::sync::Arc::new(backend))
        }
        ProviderKind::Wordmark => {
            let backend = WordBoundaryBackend::new(
                config.wordmark_api_key.clone().unwrap_or_default(),
                config.wordmark_region.clone().unwrap_or_default(),
            )?;
            Ok(std::sync::Arc::new(backend))
        }
    }
}
