//! Archive core: plan identity and per-project catalog extraction.
//!
//! Detection, deduplication, and text normalization are pure functions;
//! only `catalog` and `extract` touch the filesystem.

mod catalog;
mod dedup;
mod detect;
mod extract;
mod subagents;
mod technologies;
mod text;

pub use catalog::{
    catalog_plan, last_substantial_assistant, subagent_plan_content, CatalogOutcome,
    SIMILARITY_THRESHOLD,
};
pub use dedup::dedupe_within_session;
pub use detect::{detect_plans, DetectedPlan, MIN_PLAN_CONTENT_CHARS, PLAN_TRIGGERS};
pub use extract::{ExtractOptions, ExtractionReport, Extractor, SessionError};
pub use subagents::render_subagent_artifact;
pub use technologies::detect_technologies;
pub use text::{
    body_hash, content_hash, extract_body, extract_title, jaccard_similarity, normalize_content,
    slugify, truncate_chars,
};
