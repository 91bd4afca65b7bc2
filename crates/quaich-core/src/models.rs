//! Domain models for Quaich.
//!
//! These are the persisted shapes shared across all crates.

pub mod setting;
pub mod user;
