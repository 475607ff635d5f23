//! Completion aggregation across participants.
//!
//! Provides:
//! - `CompletionAggregator`: per-round barrier with injected `RoundHooks`
//! - `AggregatorHandle`: serializing gate for concurrent producers

mod completion;
mod dispatcher;

pub use completion::{CompletionAggregator, DuplicatePolicy, RoundHooks};
pub use dispatcher::*;
