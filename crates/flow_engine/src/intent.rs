use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::channel::{EventChannel, SubscriptionId};
use crate::plan::{ChangeMode, ContentStatePlan, FlowScope};
use crate::signature::TransitionSignature;
use crate::store::PendingStateStore;
use crate::sync::lock_or_recover;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredIntent {
    pub scope: FlowScope,
    pub plan: ContentStatePlan,
    pub mode: ChangeMode,
    pub reason: String,
    pub source_signature: TransitionSignature,
    pub timestamp_utc: DateTime<Utc>,
}

impl DeferredIntent {
    pub fn new(
        scope: FlowScope,
        plan: ContentStatePlan,
        reason: impl Into<String>,
        source_signature: TransitionSignature,
    ) -> Self {
        Self {
            scope,
            plan,
            mode: ChangeMode::SwapRequired,
            reason: reason.into(),
            source_signature,
            timestamp_utc: Utc::now(),
        }
    }
}

/// Notification raised by the world reset once it reaches its safe point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetCompleted {
    pub context_signature: TransitionSignature,
    pub reason: String,
}

/// Holds at most one deferred intent system-wide. Not a queue.
#[derive(Debug, Default)]
pub struct IntentRegistry {
    slot: Mutex<Option<DeferredIntent>>,
}

impl IntentRegistry {
    pub fn try_set(&self, intent: DeferredIntent) -> bool {
        if !intent.plan.is_valid() {
            warn!(reason = %intent.reason, "deferred_intent_rejected_invalid_plan");
            return false;
        }
        if intent.mode != ChangeMode::SwapRequired {
            warn!(
                mode = ?intent.mode,
                reason = %intent.reason,
                "deferred_intent_rejected_mode"
            );
            return false;
        }
        let mut slot = lock_or_recover(&self.slot, "intent.try_set");
        if let Some(existing) = slot.as_ref() {
            warn!(
                existing_signature = %existing.source_signature,
                existing_plan = %existing.plan,
                rejected_plan = %intent.plan,
                "deferred_intent_slot_occupied"
            );
            return false;
        }
        debug!(
            scope = ?intent.scope,
            plan = %intent.plan,
            signature = %intent.source_signature,
            "deferred_intent_set"
        );
        *slot = Some(intent);
        true
    }

    pub fn try_consume(&self, signature: &TransitionSignature) -> Option<DeferredIntent> {
        let mut slot = lock_or_recover(&self.slot, "intent.try_consume");
        match slot.as_ref() {
            Some(existing) if existing.source_signature == *signature => slot.take(),
            Some(existing) => {
                debug!(
                    stored = %existing.source_signature,
                    requested = %signature,
                    "deferred_intent_signature_mismatch"
                );
                None
            }
            None => None,
        }
    }

    pub fn peek(&self) -> Option<DeferredIntent> {
        lock_or_recover(&self.slot, "intent.peek").clone()
    }

    pub fn is_occupied(&self) -> bool {
        lock_or_recover(&self.slot, "intent.occupied").is_some()
    }

    pub fn clear(&self, reason: &str) -> Option<DeferredIntent> {
        let removed = lock_or_recover(&self.slot, "intent.clear").take();
        if let Some(intent) = removed.as_ref() {
            info!(plan = %intent.plan, reason, "deferred_intent_cleared");
        }
        removed
    }
}

/// Applies a deferred intent once the reset that was started for it reaches
/// its safe point.
pub struct CheckpointBridge {
    registry: Arc<IntentRegistry>,
    level_store: Arc<PendingStateStore>,
    phase_store: Arc<PendingStateStore>,
}

impl CheckpointBridge {
    pub fn new(
        registry: Arc<IntentRegistry>,
        level_store: Arc<PendingStateStore>,
        phase_store: Arc<PendingStateStore>,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            level_store,
            phase_store,
        })
    }

    pub fn attach(self: &Arc<Self>, resets: &EventChannel<ResetCompleted>) -> SubscriptionId {
        let bridge = Arc::clone(self);
        resets.subscribe(move |event: &ResetCompleted| {
            bridge.on_reset_completed(event);
        })
    }

    pub fn on_reset_completed(&self, event: &ResetCompleted) -> Option<ContentStatePlan> {
        let Some(intent) = self.registry.try_consume(&event.context_signature) else {
            debug!(
                signature = %event.context_signature,
                reason = %event.reason,
                "reset_completed_without_matching_intent"
            );
            return None;
        };
        let store = match intent.scope {
            FlowScope::Level => &self.level_store,
            FlowScope::Phase => &self.phase_store,
        };
        if !store.set_pending(intent.plan.clone(), &intent.reason) {
            return None;
        }
        let committed = store.try_commit_pending(&intent.reason);
        if committed.is_some() {
            info!(
                scope = ?intent.scope,
                plan = %intent.plan,
                signature = %intent.source_signature,
                waited_ms = (Utc::now() - intent.timestamp_utc).num_milliseconds(),
                "deferred_intent_applied"
            );
        }
        committed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intent(state: &str, signature: &str) -> DeferredIntent {
        DeferredIntent::new(
            FlowScope::Phase,
            ContentStatePlan::for_state(state),
            "PhaseFlow/Test",
            TransitionSignature::from_raw(signature),
        )
    }

    #[test]
    fn consume_on_empty_registry_fails() {
        let registry = IntentRegistry::default();
        assert!(registry
            .try_consume(&TransitionSignature::from_raw("sig"))
            .is_none());
    }

    #[test]
    fn second_set_without_consume_fails() {
        let registry = IntentRegistry::default();
        assert!(registry.try_set(intent("P1", "sig-a")));
        assert!(!registry.try_set(intent("P2", "sig-b")));
        assert_eq!(registry.peek().expect("slot").plan.state_id(), "P1");
    }

    #[test]
    fn mismatched_consume_leaves_entry_for_matching_consumer() {
        let registry = IntentRegistry::default();
        registry.try_set(intent("P1", "sig-a"));

        assert!(registry
            .try_consume(&TransitionSignature::from_raw("sig-b"))
            .is_none());
        assert!(registry.is_occupied());

        let consumed = registry
            .try_consume(&TransitionSignature::from_raw("sig-a"))
            .expect("matching consume");
        assert_eq!(consumed.plan.state_id(), "P1");
        assert!(!registry.is_occupied());
    }

    #[test]
    fn invalid_plan_or_in_place_mode_is_rejected() {
        let registry = IntentRegistry::default();
        assert!(!registry.try_set(intent("  ", "sig")));

        let mut in_place = intent("P1", "sig");
        in_place.mode = ChangeMode::InPlace;
        assert!(!registry.try_set(in_place));
        assert!(!registry.is_occupied());
    }

    #[test]
    fn checkpoint_commits_matching_intent_into_its_scope() {
        let registry = Arc::new(IntentRegistry::default());
        let level_store = Arc::new(PendingStateStore::new(FlowScope::Level));
        let phase_store = Arc::new(PendingStateStore::new(FlowScope::Phase));
        let bridge = CheckpointBridge::new(
            Arc::clone(&registry),
            Arc::clone(&level_store),
            Arc::clone(&phase_store),
        );
        let resets = EventChannel::new("reset_completed");
        bridge.attach(&resets);
        registry.try_set(intent("P7", "sig-7"));

        resets.publish(&ResetCompleted {
            context_signature: TransitionSignature::from_raw("other"),
            reason: "unrelated".to_string(),
        });
        assert_eq!(phase_store.current(), ContentStatePlan::NONE);
        assert!(registry.is_occupied());

        resets.publish(&ResetCompleted {
            context_signature: TransitionSignature::from_raw("sig-7"),
            reason: "swap".to_string(),
        });
        assert_eq!(phase_store.current(), ContentStatePlan::for_state("P7"));
        assert_eq!(level_store.current(), ContentStatePlan::NONE);
        assert!(!registry.is_occupied());
    }
}
