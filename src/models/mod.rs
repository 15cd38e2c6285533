//! Core data models for the match agent.

mod identity;
mod match_record;
mod stats;

pub use identity::*;
pub use match_record::*;
pub use stats::*;
