use std::sync::Arc;

use tracing::{error, info, warn};

use crate::collaborators::{EnvironmentSwapService, WorldResetService};
use crate::config::FlowConfig;
use crate::error::FlowError;
use crate::intent::{DeferredIntent, IntentRegistry};
use crate::plan::{ChangeMode, ContentStatePlan, FlowScope};
use crate::signature::{SignatureCache, SwapRequest, TransitionSignature};
use crate::store::PendingStateStore;
use crate::sync::InFlightFlag;

#[derive(Debug, Clone, Default)]
pub struct ChangeOptions {
    pub swap_request: Option<SwapRequest>,
}

impl ChangeOptions {
    pub fn with_swap(swap_request: SwapRequest) -> Self {
        Self {
            swap_request: Some(swap_request),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    InvalidPlan,
    Busy,
    InvalidSwapRequest,
    IntentSlotOccupied,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeOutcome {
    AppliedInPlace {
        committed: Option<ContentStatePlan>,
    },
    SwapFinished {
        signature: TransitionSignature,
        deferred: bool,
    },
    Dropped(DropReason),
}

impl ChangeOutcome {
    pub fn is_dropped(&self) -> bool {
        matches!(self, ChangeOutcome::Dropped(_))
    }
}

pub struct GateCollaborators {
    pub world_reset: Arc<dyn WorldResetService>,
    pub environment_swap: Arc<dyn EnvironmentSwapService>,
    pub intents: Arc<IntentRegistry>,
    pub signatures: Arc<SignatureCache>,
}

/// Single-flight entry point for content-state changes of one scope.
pub struct RequestGate {
    scope: FlowScope,
    default_mode: ChangeMode,
    store: Arc<PendingStateStore>,
    in_flight: InFlightFlag,
    collaborators: GateCollaborators,
}

impl RequestGate {
    pub fn new(
        config: &FlowConfig,
        store: Arc<PendingStateStore>,
        collaborators: GateCollaborators,
    ) -> Self {
        Self {
            scope: store.scope(),
            default_mode: config.default_change_mode,
            store,
            in_flight: InFlightFlag::default(),
            collaborators,
        }
    }

    pub fn scope(&self) -> FlowScope {
        self.scope
    }

    pub fn store(&self) -> &Arc<PendingStateStore> {
        &self.store
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_set()
    }

    pub async fn request_change_in_place(
        &self,
        plan: ContentStatePlan,
        reason: &str,
        mut options: ChangeOptions,
    ) -> Result<ChangeOutcome, FlowError> {
        options.swap_request = None;
        self.request_change(plan, reason, options).await
    }

    pub async fn request_change_with_swap(
        &self,
        plan: ContentStatePlan,
        swap_request: SwapRequest,
        reason: &str,
        mut options: ChangeOptions,
    ) -> Result<ChangeOutcome, FlowError> {
        options.swap_request = Some(swap_request);
        self.request_change(plan, reason, options).await
    }

    pub async fn request_change(
        &self,
        plan: ContentStatePlan,
        reason: &str,
        options: ChangeOptions,
    ) -> Result<ChangeOutcome, FlowError> {
        let reason = self.scope.scoped_reason(reason);
        if !plan.is_valid() {
            warn!(scope = ?self.scope, reason = %reason, "change_dropped_invalid_plan");
            return Ok(ChangeOutcome::Dropped(DropReason::InvalidPlan));
        }
        let Some(_in_flight) = self.in_flight.try_acquire() else {
            warn!(
                scope = ?self.scope,
                plan = %plan,
                reason = %reason,
                "change_dropped_request_in_flight"
            );
            return Ok(ChangeOutcome::Dropped(DropReason::Busy));
        };

        let mode = if options.swap_request.is_some() {
            ChangeMode::SwapRequired
        } else {
            self.default_mode
        };
        info!(
            scope = ?self.scope,
            plan = %plan,
            mode = ?mode,
            reason = %reason,
            "change_requested"
        );

        if !self.store.set_pending(plan.clone(), &reason) {
            return Ok(ChangeOutcome::Dropped(DropReason::InvalidPlan));
        }

        match (mode, options.swap_request) {
            (ChangeMode::InPlace, _) => self.apply_in_place(&reason).await,
            (ChangeMode::SwapRequired, Some(request)) if request.has_scene_sets() => {
                self.apply_with_swap(plan, request, &reason).await
            }
            (ChangeMode::SwapRequired, request) => {
                error!(
                    scope = ?self.scope,
                    has_request = request.is_some(),
                    reason = %reason,
                    "change_aborted_swap_request_incomplete"
                );
                self.store.clear_pending("swap request incomplete");
                Ok(ChangeOutcome::Dropped(DropReason::InvalidSwapRequest))
            }
        }
    }

    async fn apply_in_place(&self, reason: &str) -> Result<ChangeOutcome, FlowError> {
        let reset_reason = format!("{reason} (in-place content change)");
        if let Err(source) = self
            .collaborators
            .world_reset
            .request_reset(&reset_reason)
            .await
        {
            return Err(self.roll_back(source, None));
        }
        let committed = self.store.try_commit_pending(reason);
        Ok(ChangeOutcome::AppliedInPlace { committed })
    }

    async fn apply_with_swap(
        &self,
        plan: ContentStatePlan,
        request: SwapRequest,
        reason: &str,
    ) -> Result<ChangeOutcome, FlowError> {
        let signature = self.collaborators.signatures.record_started(&request);
        let intent = DeferredIntent::new(self.scope, plan, reason, signature.clone());
        if !self.collaborators.intents.try_set(intent) {
            warn!(
                scope = ?self.scope,
                signature = %signature,
                occupant = ?self.collaborators.intents.peek().map(|held| held.scope),
                "change_dropped_intent_slot_occupied"
            );
            self.collaborators.signatures.clear_if(&signature);
            self.store.clear_pending("deferred intent slot occupied");
            return Ok(ChangeOutcome::Dropped(DropReason::IntentSlotOccupied));
        }

        if let Err(source) = self
            .collaborators
            .environment_swap
            .transition(&request)
            .await
        {
            self.collaborators.signatures.clear_if(&signature);
            return Err(self.roll_back(source, Some(&signature)));
        }

        // The checkpoint bridge normally consumed the intent mid-swap.
        let leftover = self.collaborators.intents.try_consume(&signature);
        if let Some(intent) = leftover.as_ref() {
            warn!(
                scope = ?self.scope,
                plan = %intent.plan,
                signature = %signature,
                "swap_finished_without_checkpoint"
            );
            self.store.clear_pending("swap finished without checkpoint");
        }
        Ok(ChangeOutcome::SwapFinished {
            signature,
            deferred: leftover.is_none(),
        })
    }

    fn roll_back(
        &self,
        source: crate::collaborators::CollaboratorError,
        registered_signature: Option<&TransitionSignature>,
    ) -> FlowError {
        error!(scope = ?self.scope, error = %source, "change_failed_rolling_back");
        self.store.clear_pending("content change failed");
        if let Some(signature) = registered_signature {
            self.collaborators.intents.try_consume(signature);
        }
        FlowError::Collaborator {
            scope: self.scope,
            source,
        }
    }
}
