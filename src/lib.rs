//! riskmeter: rate the collective anxiety of a batch of news headlines with
//! an LLM, serving one cached verdict per TTL window.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod meter;
pub mod providers;

pub use error::{MeterError, Result};
pub use meter::{NewsItem, RiskMeter, Verdict};
