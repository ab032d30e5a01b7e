//! AI helpers over an OpenAI-compatible chat completions API.
//!
//! * [`LlmFailureAnalyzer`]: root-cause analysis for failing tests, used by the
//!   reporting hook when the [`AiCapability`] probe succeeds.
//! * [`DataGenerator`] and [`TestGenerator`]: test data and test source from
//!   plain-language descriptions, used by the CLI.

mod analyzer;
mod capability;
mod client;
mod data;
mod generate;
pub mod parse;

pub use analyzer::LlmFailureAnalyzer;
pub use capability::{AiCapability, UnavailableReason};
pub use client::{FailingLlmBackend, LlmBackend, MockLlmBackend, OpenAiCompatibleBackend, Prompt};
pub use data::{DataGenerator, fallback_user};
pub use generate::{DbKind, TestGenerator, api_test_name};
pub use parse::TestImprovements;
