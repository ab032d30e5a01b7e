//! Canonical data model for the faultline pipeline.
//!
//! Defines tracker tickets, test executions and results, failure evidence,
//! runner outcome events, and typed per-test ticket options.
//! All other crates depend on these types.

pub mod analysis;
pub mod evidence;
pub mod execution;
pub mod options;
pub mod ticket;
