//! Action generation: one prioritized follow-up per attribution.

use std::sync::Arc;

use async_trait::async_trait;

use crate::capabilities::{GenerationCapability, GenerationOptions, TicketSink, with_deadline};
use crate::feedback::{ActionItem, ActionType, AttributionResult, Priority, RootCause};
use crate::runtime::EngineConfig;
use crate::stage::{Stage, StageContext, StageError, StagePartial};
use crate::state::StateSnapshot;
use crate::types::StageKind;

/// Maps each attribution to exactly one action item.
///
/// The category→(type, priority) mapping is deterministic; the generation
/// capability only writes the human-readable description. On any generation
/// failure the item falls back to the configured default type/priority with a
/// templated description — items are never dropped. Delivery through the
/// ticket sink is fire-and-log: a sink failure alerts, it never fails the
/// stage.
pub struct GenerateActions {
    generation: Arc<dyn GenerationCapability>,
    sink: Arc<dyn TicketSink>,
    config: Arc<EngineConfig>,
}

impl GenerateActions {
    pub fn new(
        generation: Arc<dyn GenerationCapability>,
        sink: Arc<dyn TicketSink>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            generation,
            sink,
            config,
        }
    }

    /// Deterministic routing table from root cause to action shape.
    fn route(&self, category: RootCause) -> (ActionType, Priority, &'static str) {
        match category {
            RootCause::NeedsInvestigation => (ActionType::Ticket, Priority::High, "issue-tracker"),
            RootCause::KnownLimitation => (ActionType::DocUpdate, Priority::Medium, "docs-queue"),
            RootCause::UserError => (ActionType::EmailDraft, Priority::Low, "support-outbox"),
            RootCause::LogisticsNoise => {
                (ActionType::EmailDraft, Priority::Low, "logistics-desk")
            }
            RootCause::Unclassified => (
                self.config.default_action,
                self.config.default_priority,
                "triage-queue",
            ),
        }
    }

    fn prompt_for(&self, attribution: &AttributionResult, action_type: ActionType) -> String {
        format!(
            "Write a short, actionable description for a {action_type} follow-up.\n\
             Feedback id: {}\nRoot cause: {}\nJustification: {}\n\
             Reply with the description text only.",
            attribution.item_id, attribution.category, attribution.justification
        )
    }

    fn templated_description(attribution: &AttributionResult) -> String {
        format!(
            "Follow up on feedback {} (root cause: {}): {}",
            attribution.item_id, attribution.category, attribution.justification
        )
    }

    fn default_actions(&self, attributions: &[AttributionResult]) -> Vec<ActionItem> {
        attributions
            .iter()
            .map(|attribution| {
                let (action_type, priority, target) = self.route(attribution.category);
                ActionItem {
                    item_id: attribution.item_id.clone(),
                    action_type,
                    priority,
                    target: target.to_string(),
                    description: Self::templated_description(attribution),
                }
            })
            .collect()
    }
}

#[async_trait]
impl Stage for GenerateActions {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: StageContext,
    ) -> Result<StagePartial, StageError> {
        let attributions = &snapshot.attributions;
        let mut partial = StagePartial::new();
        let mut actions: Vec<ActionItem> = Vec::with_capacity(attributions.len());

        let options = GenerationOptions {
            model: self.config.model.clone(),
            temperature: self.config.temperature,
        };

        for attribution in attributions {
            let (action_type, priority, target) = self.route(attribution.category);

            let description = match with_deadline(
                self.config.call_timeout,
                "generation",
                self.generation
                    .complete(&self.prompt_for(attribution, action_type), &options),
            )
            .await
            {
                Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
                Ok(_) | Err(_) => {
                    partial.alert(
                        StageKind::Act,
                        format!(
                            "description generation failed for item {}; using default action shape",
                            attribution.item_id
                        ),
                    );
                    let action = ActionItem {
                        item_id: attribution.item_id.clone(),
                        action_type: self.config.default_action,
                        priority: self.config.default_priority,
                        target: target.to_string(),
                        description: Self::templated_description(attribution),
                    };
                    self.deliver(&action, &mut partial).await;
                    actions.push(action);
                    continue;
                }
            };

            let action = ActionItem {
                item_id: attribution.item_id.clone(),
                action_type,
                priority,
                target: target.to_string(),
                description,
            };
            self.deliver(&action, &mut partial).await;
            actions.push(action);
        }

        partial.log(
            StageKind::Act,
            format!("generated {} action item(s)", actions.len()),
        );
        let _ = ctx.emit("act", format!("{} action(s)", actions.len()));
        Ok(partial.with_actions(actions))
    }

    /// Exhaustion fallback: default-shaped action for every attribution.
    fn fallback(&self, snapshot: &StateSnapshot) -> Option<StagePartial> {
        let mut partial =
            StagePartial::new().with_actions(self.default_actions(&snapshot.attributions));
        partial.alert(
            StageKind::Act,
            "action generation degraded: default action shapes substituted",
        );
        Some(partial)
    }
}

impl GenerateActions {
    async fn deliver(&self, action: &ActionItem, partial: &mut StagePartial) {
        if let Err(err) = self.sink.deliver(action).await {
            partial.alert(
                StageKind::Act,
                format!("delivery failed for item {}: {err}", action.item_id),
            );
        }
    }
}
