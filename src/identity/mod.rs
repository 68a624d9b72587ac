//! Identity module
//!
//! Subject to per-store id resolution for the gateway.

mod resolver;
mod store;

pub use resolver::IdentityResolver;
pub use store::{IdentityStore, MemoryIdentityStore, PgIdentityStore, StoreProfile};
