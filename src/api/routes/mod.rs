//! Route handlers.

pub mod health;
pub mod meter;
pub mod ping;
