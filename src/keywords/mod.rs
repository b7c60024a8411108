//! Keyphrase extraction for chunk text.

pub mod extractor;
pub mod stopwords;

pub use extractor::{KeywordExtractorConfig, extract_keywords, extract_keywords_fallback};
