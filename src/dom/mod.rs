pub mod extractor;
pub mod row;

pub use extractor::FrameExtractor;
pub use row::{fallback_key, normalize_text, RowParser};
