use rustc_hash::FxHashMap;
use rustc_hash::FxHashSet;

use super::Reducer;
use crate::{channels::Channel, stage::StagePartial, state::ReviewState};

/// Unions incoming feedback items into the accumulated collection, keyed by
/// item id.
///
/// First-seen insertion order is preserved for display; on id collision the
/// incoming entry wins (last-write-wins by run).
#[derive(Debug, PartialEq, Clone, Hash, Eq)]
pub struct MergeFeedback;

impl Reducer for MergeFeedback {
    fn apply(&self, state: &mut ReviewState, update: &StagePartial) {
        let Some(incoming) = &update.feedback else {
            return;
        };
        if incoming.is_empty() {
            return;
        }

        let existing = state.feedback.get_mut();
        let mut index: FxHashMap<String, usize> = existing
            .iter()
            .enumerate()
            .map(|(i, item)| (item.id.clone(), i))
            .collect();

        for item in incoming {
            match index.get(&item.id) {
                Some(&slot) => existing[slot] = item.clone(),
                None => {
                    index.insert(item.id.clone(), existing.len());
                    existing.push(item.clone());
                }
            }
        }
    }
}

/// Unions incoming identifiers into the processed-id set, preserving
/// insertion order of first appearance.
#[derive(Debug, PartialEq, Clone, Hash, Eq)]
pub struct UnionProcessed;

impl Reducer for UnionProcessed {
    fn apply(&self, state: &mut ReviewState, update: &StagePartial) {
        let Some(incoming) = &update.processed else {
            return;
        };
        if incoming.is_empty() {
            return;
        }

        let existing = state.processed.get_mut();
        let mut seen: FxHashSet<String> = existing.iter().cloned().collect();
        for id in incoming {
            if seen.insert(id.clone()) {
                existing.push(id.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::FeedbackItem;

    #[test]
    fn merge_keeps_first_seen_order_and_incoming_wins() {
        let mut state = ReviewState::default();
        state.feedback.get_mut().extend(vec![
            FeedbackItem::new("a", "old a", 1),
            FeedbackItem::new("b", "old b", 2),
        ]);

        let update = StagePartial::new().with_feedback(vec![
            FeedbackItem::new("b", "new b", 5),
            FeedbackItem::new("c", "new c", 3),
        ]);
        MergeFeedback.apply(&mut state, &update);

        let snapshot = state.feedback.snapshot();
        let ids: Vec<_> = snapshot.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(snapshot[1].body, "new b");
        assert_eq!(snapshot[1].rating, 5);
    }

    #[test]
    fn merge_into_empty_yields_exactly_the_update() {
        let mut state = ReviewState::default();
        let incoming = vec![
            FeedbackItem::new("x", "one", 1),
            FeedbackItem::new("y", "two", 2),
        ];
        MergeFeedback.apply(
            &mut state,
            &StagePartial::new().with_feedback(incoming.clone()),
        );
        assert_eq!(state.feedback.snapshot(), incoming);
    }

    #[test]
    fn union_processed_deduplicates() {
        let mut state = ReviewState::default();
        state
            .processed
            .get_mut()
            .extend(vec!["id1".to_string(), "id2".to_string()]);

        let mut update = StagePartial::new();
        update.processed = Some(vec!["id2".into(), "id3".into()]);
        UnionProcessed.apply(&mut state, &update);

        assert_eq!(
            state.processed.snapshot(),
            vec!["id1".to_string(), "id2".to_string(), "id3".to_string()]
        );
    }
}
