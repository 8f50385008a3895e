//! Types shared between the prodent client library and its front ends.

pub mod events;
pub mod models;

pub use events::*;
pub use models::*;
