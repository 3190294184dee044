//! Implementation modules for `structural`.
//!
//! `src/structural.rs` is the stable facade; the per-mandate walks live here.

pub(crate) mod cart;
pub(crate) mod cross;
pub(crate) mod intent;
pub(crate) mod payment;
pub(crate) mod request;
pub(crate) mod walk;

#[cfg(test)]
pub(crate) mod tests;
