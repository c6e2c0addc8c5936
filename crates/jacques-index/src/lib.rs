//! Keyword search over archived conversation manifests.
//!
//! Tokenization and field extraction are pure; the `SearchIndex` is a
//! single JSON artifact written via temp-file + rename with one writer per
//! process. Searches never mutate the index.

mod fields;
mod index;
mod tokenize;

pub use fields::{extract_keywords, FieldTag, MAX_FIELD_WEIGHT};
pub use index::{
    filter_hits, rebuild_from_manifests, IndexMetadata, KeywordRef, ProjectStats, SearchFilters,
    SearchHit, SearchIndex, SEARCH_LIMIT_CAP,
};
pub use tokenize::{is_stop_word, tokenize, MAX_TOKEN_CHARS, MIN_TOKEN_CHARS};
