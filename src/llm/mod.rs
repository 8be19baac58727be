//! Gemini access and recovery of structured output
//!
//! - `client`: the HTTP boundary and the quota-aware retry loop
//! - `parse` / `repair`: turning raw model text back into a report wrapper
//! - `prompts`: full and compact prompt variants

pub mod client;
pub mod models;
pub mod parse;
pub mod prompts;
pub mod repair;

#[cfg(test)]
pub(crate) mod test_support;

pub use client::{GeminiClient, ModelBackend, ModelCaller};
pub use parse::{recover_wrapper, Recovered, RecoveryFailure, RecoveryStage};
pub use prompts::PromptProfile;
