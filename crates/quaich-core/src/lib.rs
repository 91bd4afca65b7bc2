//! Quaich Core: domain models, repository traits and shared error
//! types for the whisky club platform.

pub mod error;
pub mod models;
pub mod repository;

pub use error::{QuaichError, QuaichResult};
