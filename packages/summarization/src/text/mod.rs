//! Text measurement and segmentation.

pub mod segmenter;
pub mod tokens;

pub use segmenter::{split_into_chunks, split_sentences};
pub use tokens::{estimate_tokens, normalize_whitespace, CHARS_PER_TOKEN};
