//! Local (reqwest-backed) providers and the streaming answer pipeline.
//!
//! This crate is intentionally:
//! - **tolerant**: malformed provider records are repaired and malformed
//!   stream lines skipped, never fatal
//! - **single-owner**: each section is mutated by exactly one task and
//!   observed through watch snapshots
//! - **deterministic**: prompt composition and Markdown repair are pure

pub mod completion;
pub mod compose;
pub mod demux;
pub mod normalize;
pub mod orchestrate;
pub mod repair;
pub mod search;
pub mod section;
