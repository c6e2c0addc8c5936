//! Test fixtures shared by the jacques integration suites.

mod builder;
mod world;

pub use builder::TranscriptBuilder;
pub use world::TestWorld;
