pub mod segmenter;

pub use segmenter::{DEFAULT_MAX_CHUNK_CHARS, PARAGRAPH_BREAK, Segmenter, normalize};
