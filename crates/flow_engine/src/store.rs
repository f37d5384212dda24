use std::sync::Mutex;

use tracing::{debug, info, warn};

use crate::channel::EventChannel;
use crate::plan::{ContentStatePlan, FlowScope};
use crate::sync::lock_or_recover;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingStateEventKind {
    PendingSet,
    Committed,
    PendingCleared,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingStateEvent {
    pub scope: FlowScope,
    pub kind: PendingStateEventKind,
    pub previous: ContentStatePlan,
    pub plan: ContentStatePlan,
    pub reason: String,
}

#[derive(Debug, Default)]
struct Slots {
    current: ContentStatePlan,
    pending: ContentStatePlan,
}

#[derive(Debug)]
pub struct PendingStateStore {
    scope: FlowScope,
    slots: Mutex<Slots>,
    events: EventChannel<PendingStateEvent>,
}

impl PendingStateStore {
    pub fn new(scope: FlowScope) -> Self {
        Self {
            scope,
            slots: Mutex::new(Slots::default()),
            events: EventChannel::new("pending_state"),
        }
    }

    pub fn scope(&self) -> FlowScope {
        self.scope
    }

    pub fn events(&self) -> &EventChannel<PendingStateEvent> {
        &self.events
    }

    pub fn current(&self) -> ContentStatePlan {
        self.lock("store.current").current.clone()
    }

    pub fn pending(&self) -> ContentStatePlan {
        self.lock("store.pending").pending.clone()
    }

    pub fn has_pending(&self) -> bool {
        self.lock("store.has_pending").pending.is_valid()
    }

    pub fn set_pending(&self, plan: ContentStatePlan, reason: &str) -> bool {
        if !plan.is_valid() {
            warn!(scope = ?self.scope, reason, "pending_rejected_invalid_plan");
            return false;
        }
        let previous = {
            let mut slots = self.lock("store.set_pending");
            std::mem::replace(&mut slots.pending, plan.clone())
        };
        if previous.is_valid() && previous != plan {
            warn!(
                scope = ?self.scope,
                replaced = %previous,
                plan = %plan,
                "pending_replaced_before_commit"
            );
        }
        debug!(scope = ?self.scope, plan = %plan, reason, "pending_set");
        self.publish(PendingStateEventKind::PendingSet, previous, plan, reason);
        true
    }

    pub fn try_commit_pending(&self, reason: &str) -> Option<ContentStatePlan> {
        let (previous, committed) = {
            let mut slots = self.lock("store.commit");
            if !slots.pending.is_valid() {
                drop(slots);
                warn!(scope = ?self.scope, reason, "commit_without_pending");
                return None;
            }
            let committed = std::mem::take(&mut slots.pending);
            let previous = std::mem::replace(&mut slots.current, committed.clone());
            (previous, committed)
        };
        info!(
            scope = ?self.scope,
            previous = %previous,
            plan = %committed,
            reason,
            "pending_committed"
        );
        self.publish(
            PendingStateEventKind::Committed,
            previous,
            committed.clone(),
            reason,
        );
        Some(committed)
    }

    pub fn clear_pending(&self, reason: &str) -> bool {
        let cleared = {
            let mut slots = self.lock("store.clear");
            if !slots.pending.is_valid() {
                return false;
            }
            std::mem::take(&mut slots.pending)
        };
        info!(scope = ?self.scope, plan = %cleared, reason, "pending_cleared");
        self.publish(
            PendingStateEventKind::PendingCleared,
            cleared,
            ContentStatePlan::NONE,
            reason,
        );
        true
    }

    fn publish(
        &self,
        kind: PendingStateEventKind,
        previous: ContentStatePlan,
        plan: ContentStatePlan,
        reason: &str,
    ) {
        self.events.publish(&PendingStateEvent {
            scope: self.scope,
            kind,
            previous,
            plan,
            reason: reason.to_string(),
        });
    }

    fn lock(&self, operation: &'static str) -> std::sync::MutexGuard<'_, Slots> {
        lock_or_recover(&self.slots, operation)
    }
}
