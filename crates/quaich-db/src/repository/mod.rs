//! SurrealDB repository implementations.

mod setting;
mod user;

pub use setting::SurrealSettingRepository;
pub use user::SurrealUserRepository;
