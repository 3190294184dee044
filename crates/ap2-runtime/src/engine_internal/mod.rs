//! Implementation modules for `engine`.
//!
//! `src/engine.rs` is the stable facade.

pub(crate) mod complete;
pub(crate) mod transitions;
