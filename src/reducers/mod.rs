//! State merge strategies.
//!
//! Every reducer takes the live [`ReviewState`] and a [`StagePartial`] and
//! folds the partial's field for its channel into the state. Three merge
//! families cover the engine:
//!
//! - **append** ([`AppendLogs`], [`AppendAlerts`], [`AppendHistory`]): ordered
//!   concatenation, never drops entries.
//! - **replace** ([`ReplaceBatch`], [`ReplaceHighRisk`], [`ReplaceAttributions`],
//!   [`ReplaceActions`]): incoming value fully replaces the existing one;
//!   used for "latest computed result" channels.
//! - **keyed merge** ([`MergeFeedback`], [`UnionProcessed`]): union keyed by
//!   identifier, first-seen insertion order preserved, incoming entry wins on
//!   collision.
//!
//! An absent field (`None`) is a no-op for every reducer. A present-but-empty
//! field is a no-op for append/merge reducers; for replace reducers it is a
//! deliberate clear, which the per-run channels (`batch`, `high_risk`, ...)
//! rely on between runs. Reapplying the same partial is safe only because
//! idempotency is enforced upstream via the processed-id set.

mod append;
mod merge;
mod reducer_registry;
mod replace;

pub use append::{AppendAlerts, AppendHistory, AppendLogs};
pub use merge::{MergeFeedback, UnionProcessed};
pub use reducer_registry::ReducerRegistry;
pub use replace::{ReplaceActions, ReplaceAttributions, ReplaceBatch, ReplaceHighRisk};

use crate::stage::StagePartial;
use crate::state::ReviewState;
use crate::types::ChannelType;
use std::fmt;

/// Unified reducer trait: fold one channel of a partial update into state.
pub trait Reducer: Send + Sync {
    fn apply(&self, state: &mut ReviewState, update: &StagePartial);
}

#[derive(Debug)]
pub enum ReducerError {
    UnknownChannel(ChannelType),
}

impl fmt::Display for ReducerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReducerError::UnknownChannel(channel) => {
                write!(f, "no reducers registered for channel: {channel}")
            }
        }
    }
}

impl std::error::Error for ReducerError {}
