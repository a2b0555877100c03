//! The four triage pipeline stages.
//!
//! Each stage is a [`Stage`](crate::stage::Stage) implementation: a pure
//! transform from a state snapshot to a partial update, calling out to
//! external capabilities where needed and degrading per the error-handling
//! design rather than dropping work.

mod act;
mod attribute;
mod filter;
mod generate;

pub use act::GenerateActions;
pub use attribute::AttributeViaRetrieval;
pub use filter::FilterHighRisk;
pub use generate::{GenerateBatch, QueueFeed, SampledFeed};
