//! valo-coach library crate
//!
//! Exposes the event handling, model access and report recovery modules so
//! benchmarks and the CLI share one implementation.

pub mod config;
pub mod error;
pub mod events;
pub mod fake_log;
pub mod llm;
pub mod pipeline;
pub mod report;
pub mod util;
