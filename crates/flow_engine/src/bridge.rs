use std::sync::{Arc, Mutex};

use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::channel::{EventChannel, SubscriptionId};
use crate::collaborators::{ConcurrencyTokenService, SceneClassifier};
use crate::config::FlowConfig;
use crate::pipeline::{ContentStartPipeline, ContentStartRequest};
use crate::plan::{ContentStatePlan, FlowScope};
use crate::signature::{SignatureCache, SwapRequest, TransitionSignature};
use crate::store::{PendingStateEvent, PendingStateEventKind};
use crate::sync::lock_or_recover;
use crate::tasks::BackgroundTasks;

/// Raised by the environment-swap collaborator when a swap fully finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapCompleted {
    pub request: SwapRequest,
}

impl SwapCompleted {
    pub fn signature(&self) -> TransitionSignature {
        self.request.signature()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCorrelation {
    pub signature: TransitionSignature,
    pub plan: ContentStatePlan,
    pub target_environment: String,
    pub profile: String,
    pub reason: String,
    generation: u64,
}

impl PendingCorrelation {
    pub fn content_id(&self) -> &str {
        self.plan.content_id()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitDecision {
    Ignored,
    RunNow,
    Deferred {
        superseded: Option<TransitionSignature>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionDecision {
    NoPendingEntry,
    Discarded,
    Scheduled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionResult {
    PipelineRan,
    TokenStillActive,
    AlreadyResolved,
}

pub struct BridgeCollaborators {
    pub tokens: Arc<dyn ConcurrencyTokenService>,
    pub scenes: Arc<dyn SceneClassifier>,
    pub signatures: Arc<SignatureCache>,
    pub pipeline: Arc<ContentStartPipeline>,
    pub tasks: Arc<BackgroundTasks>,
}

#[derive(Debug, Default)]
struct BridgeState {
    pending: Option<PendingCorrelation>,
    next_generation: u64,
}

/// Correlates a content commit with the environment swap that was running
/// when it happened, so the content-start pipeline runs once, after the swap.
pub struct CorrelationBridge {
    name: &'static str,
    scope: FlowScope,
    config: FlowConfig,
    state: Mutex<BridgeState>,
    collaborators: BridgeCollaborators,
}

impl CorrelationBridge {
    pub fn new(
        name: &'static str,
        scope: FlowScope,
        config: FlowConfig,
        collaborators: BridgeCollaborators,
    ) -> Arc<Self> {
        Arc::new(Self {
            name,
            scope,
            config: config.normalized(),
            state: Mutex::new(BridgeState::default()),
            collaborators,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn attach(
        self: &Arc<Self>,
        commits: &EventChannel<PendingStateEvent>,
        completions: &EventChannel<SwapCompleted>,
    ) -> (SubscriptionId, SubscriptionId) {
        let on_commit = Arc::clone(self);
        let commit_id = commits.subscribe(move |event: &PendingStateEvent| {
            if event.kind == PendingStateEventKind::Committed {
                on_commit.on_committed(&event.plan, &event.reason);
            }
        });
        let on_complete = Arc::clone(self);
        let complete_id = completions.subscribe(move |event: &SwapCompleted| {
            on_complete.on_swap_completed(event);
        });
        (commit_id, complete_id)
    }

    pub fn pending(&self) -> Option<PendingCorrelation> {
        lock_or_recover(&self.state, "bridge.pending").pending.clone()
    }

    pub fn on_committed(self: &Arc<Self>, plan: &ContentStatePlan, reason: &str) -> CommitDecision {
        if !self.scope.owns_reason(reason) {
            debug!(bridge = self.name, reason, "commit_ignored_foreign_reason");
            return CommitDecision::Ignored;
        }

        let started = self.collaborators.signatures.last_started();
        let swap_active = self
            .collaborators
            .tokens
            .is_token_active(&self.config.swap_token_id);
        let gameplay_now_or_next = self.collaborators.scenes.is_current_environment_gameplay()
            || started.as_ref().is_some_and(|started| {
                self.collaborators
                    .scenes
                    .is_gameplay_scene(&started.target_active_scene)
            });

        if !(swap_active && gameplay_now_or_next) {
            let request = ContentStartRequest {
                scope: self.scope,
                plan: plan.clone(),
                signature: TransitionSignature::UNKNOWN,
                profile: String::new(),
                target_environment: self.collaborators.scenes.current_environment(),
                reason: reason.to_string(),
            };
            self.spawn_pipeline(request);
            return CommitDecision::RunNow;
        }

        let (signature, target_environment, profile) = match started {
            Some(started) => (
                started.signature,
                started.target_active_scene,
                started.profile,
            ),
            None => (TransitionSignature::UNKNOWN, String::new(), String::new()),
        };
        let superseded = {
            let mut state = lock_or_recover(&self.state, "bridge.commit");
            state.next_generation = state.next_generation.wrapping_add(1);
            let entry = PendingCorrelation {
                signature: signature.clone(),
                plan: plan.clone(),
                target_environment,
                profile,
                reason: reason.to_string(),
                generation: state.next_generation,
            };
            state.pending.replace(entry).map(|old| old.signature)
        };
        if let Some(old) = superseded.as_ref() {
            warn!(
                bridge = self.name,
                discarded_signature = %old,
                signature = %signature,
                plan = %plan,
                "correlation_superseded_pending_dropped"
            );
        }
        info!(
            bridge = self.name,
            signature = %signature,
            plan = %plan,
            "correlation_awaiting_swap"
        );
        CommitDecision::Deferred { superseded }
    }

    pub fn on_swap_completed(self: &Arc<Self>, event: &SwapCompleted) -> CompletionDecision {
        let completed = event.signature();
        let generation = {
            let mut state = lock_or_recover(&self.state, "bridge.completed");
            let Some(entry) = state.pending.as_ref() else {
                return CompletionDecision::NoPendingEntry;
            };
            if entry.signature.is_known() && entry.signature != completed {
                let discarded = state.pending.take();
                drop(state);
                if let Some(discarded) = discarded {
                    warn!(
                        bridge = self.name,
                        pending_signature = %discarded.signature,
                        completed_signature = %completed,
                        plan = %discarded.plan,
                        "correlation_mismatch_discarded"
                    );
                }
                return CompletionDecision::Discarded;
            }
            entry.generation
        };

        let bridge = Arc::clone(self);
        self.collaborators
            .tasks
            .spawn("correlation_completion", async move {
                bridge.finish_after_token_release(generation).await;
            });
        CompletionDecision::Scheduled
    }

    async fn finish_after_token_release(&self, generation: u64) -> CompletionResult {
        if !self.wait_for_token_release().await {
            warn!(
                bridge = self.name,
                timeout_ms = self.config.token_release_timeout.as_millis() as u64,
                "correlation_token_still_active_entry_kept"
            );
            return CompletionResult::TokenStillActive;
        }

        let entry = {
            let mut state = lock_or_recover(&self.state, "bridge.finish");
            match state.pending.as_ref() {
                Some(entry) if entry.generation == generation => state.pending.take(),
                _ => None,
            }
        };
        let Some(entry) = entry else {
            debug!(bridge = self.name, "correlation_already_resolved");
            return CompletionResult::AlreadyResolved;
        };

        info!(
            bridge = self.name,
            signature = %entry.signature,
            plan = %entry.plan,
            "correlation_resolved"
        );
        self.collaborators
            .pipeline
            .run(ContentStartRequest {
                scope: self.scope,
                plan: entry.plan,
                signature: entry.signature,
                profile: entry.profile,
                target_environment: entry.target_environment,
                reason: entry.reason,
            })
            .await;
        CompletionResult::PipelineRan
    }

    async fn wait_for_token_release(&self) -> bool {
        let token = self.config.swap_token_id.as_str();
        let deadline = Instant::now() + self.config.token_release_timeout;
        while self.collaborators.tokens.is_token_active(token) {
            if Instant::now() >= deadline {
                return false;
            }
            sleep(self.config.token_poll_interval).await;
        }
        true
    }

    fn spawn_pipeline(&self, request: ContentStartRequest) {
        let pipeline = Arc::clone(&self.collaborators.pipeline);
        self.collaborators
            .tasks
            .spawn("content_start_pipeline", async move {
                pipeline.run(request).await;
            });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use super::*;
    use crate::collaborators::{GameLoopService, GameLoopState, IntroSequenceCoordinator};
    use crate::test_support::{FakeEnvironment, FakeGameLoop, FakeIntro};

    struct Harness {
        env: Arc<FakeEnvironment>,
        intro: Arc<FakeIntro>,
        signatures: Arc<SignatureCache>,
        tasks: Arc<BackgroundTasks>,
        bridge: Arc<CorrelationBridge>,
    }

    fn harness(scope: FlowScope) -> Harness {
        let env = FakeEnvironment::new();
        env.set_current_scene("Gameplay");
        let intro = FakeIntro::new();
        let signatures = Arc::new(SignatureCache::default());
        let tasks = Arc::new(BackgroundTasks::default());
        let pipeline = Arc::new(ContentStartPipeline::new(
            FlowConfig::default(),
            FakeGameLoop::new(GameLoopState::Ready, false) as Arc<dyn GameLoopService>,
            Some(Arc::clone(&intro) as Arc<dyn IntroSequenceCoordinator>),
        ));
        let bridge = CorrelationBridge::new(
            "test",
            scope,
            FlowConfig::default(),
            BridgeCollaborators {
                tokens: Arc::clone(&env) as Arc<dyn ConcurrencyTokenService>,
                scenes: Arc::clone(&env) as Arc<dyn SceneClassifier>,
                signatures: Arc::clone(&signatures),
                pipeline,
                tasks: Arc::clone(&tasks),
            },
        );
        Harness {
            env,
            intro,
            signatures,
            tasks,
            bridge,
        }
    }

    fn completed(request: &SwapRequest) -> SwapCompleted {
        SwapCompleted {
            request: request.clone(),
        }
    }

    fn other_request() -> SwapRequest {
        SwapRequest::new(vec!["Arena".to_string()], vec!["Gameplay".to_string()], "Arena")
    }

    #[tokio::test(start_paused = true)]
    async fn commit_without_active_swap_runs_pipeline_immediately() {
        let h = harness(FlowScope::Level);
        let decision = h
            .bridge
            .on_committed(&ContentStatePlan::for_state("L1"), "LevelFlow/Start");

        assert_eq!(decision, CommitDecision::RunNow);
        h.tasks.drain().await;
        assert_eq!(h.intro.contexts().len(), 1);
        assert!(h.bridge.pending().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn foreign_reason_prefix_is_ignored() {
        let h = harness(FlowScope::Level);
        let decision = h
            .bridge
            .on_committed(&ContentStatePlan::for_state("P1"), "PhaseFlow/Next");

        assert_eq!(decision, CommitDecision::Ignored);
        h.tasks.drain().await;
        assert!(h.intro.contexts().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_signature_runs_on_any_completion_exactly_once() {
        let h = harness(FlowScope::Phase);
        h.env.token_active.store(true, Ordering::SeqCst);

        let decision = h
            .bridge
            .on_committed(&ContentStatePlan::for_state("P1"), "PhaseFlow/Next");
        assert_eq!(decision, CommitDecision::Deferred { superseded: None });
        assert_eq!(
            h.bridge.pending().expect("entry").signature,
            TransitionSignature::UNKNOWN
        );

        h.env.token_active.store(false, Ordering::SeqCst);
        assert_eq!(
            h.bridge.on_swap_completed(&completed(&other_request())),
            CompletionDecision::Scheduled
        );
        h.bridge.on_swap_completed(&completed(&FakeEnvironment::gameplay_request()));
        h.tasks.drain().await;

        assert_eq!(h.intro.contexts().len(), 1);
        assert!(h.bridge.pending().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn mismatched_completion_discards_entry_without_running() {
        let h = harness(FlowScope::Level);
        let s1 = FakeEnvironment::gameplay_request();
        h.signatures.record_started(&s1);
        h.env.token_active.store(true, Ordering::SeqCst);
        h.bridge
            .on_committed(&ContentStatePlan::for_state("L1"), "LevelFlow/Start");
        h.env.token_active.store(false, Ordering::SeqCst);

        assert_eq!(
            h.bridge.on_swap_completed(&completed(&other_request())),
            CompletionDecision::Discarded
        );
        assert!(h.bridge.pending().is_none());
        assert_eq!(
            h.bridge.on_swap_completed(&completed(&s1)),
            CompletionDecision::NoPendingEntry
        );
        h.tasks.drain().await;
        assert!(h.intro.contexts().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn matching_completion_waits_for_token_release() {
        let h = harness(FlowScope::Level);
        let s1 = FakeEnvironment::gameplay_request().with_profile("startup");
        h.signatures.record_started(&s1);
        h.env.token_active.store(true, Ordering::SeqCst);
        h.bridge
            .on_committed(&ContentStatePlan::new("L1", "level.one", ""), "LevelFlow/Start");

        let env = Arc::clone(&h.env);
        tokio::spawn(async move {
            sleep(Duration::from_millis(200)).await;
            env.token_active.store(false, Ordering::SeqCst);
        });
        assert_eq!(
            h.bridge.on_swap_completed(&completed(&s1)),
            CompletionDecision::Scheduled
        );
        h.tasks.drain().await;

        let contexts = h.intro.contexts();
        assert_eq!(contexts.len(), 1);
        assert_eq!(contexts[0].signature, s1.signature());
        assert_eq!(contexts[0].profile, "startup");
        assert_eq!(contexts[0].target_environment, "Gameplay");
        assert!(h.bridge.pending().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn token_timeout_keeps_entry_for_later_completion() {
        let h = harness(FlowScope::Level);
        let s1 = FakeEnvironment::gameplay_request();
        h.signatures.record_started(&s1);
        h.env.token_active.store(true, Ordering::SeqCst);
        h.bridge
            .on_committed(&ContentStatePlan::for_state("L1"), "LevelFlow/Start");

        h.bridge.on_swap_completed(&completed(&s1));
        h.tasks.drain().await;
        assert!(h.intro.contexts().is_empty());
        assert!(h.bridge.pending().is_some());

        h.env.token_active.store(false, Ordering::SeqCst);
        h.bridge.on_swap_completed(&completed(&s1));
        h.tasks.drain().await;
        assert_eq!(h.intro.contexts().len(), 1);
        assert!(h.bridge.pending().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn newer_commit_supersedes_pending_entry() {
        let h = harness(FlowScope::Phase);
        let s1 = FakeEnvironment::gameplay_request();
        h.signatures.record_started(&s1);
        h.env.token_active.store(true, Ordering::SeqCst);
        h.bridge
            .on_committed(&ContentStatePlan::for_state("P1"), "PhaseFlow/A");

        let s2 = other_request().with_profile("arena");
        h.env.set_gameplay_scenes(&["Gameplay", "Arena"]);
        h.signatures.record_started(&s2);
        let decision = h
            .bridge
            .on_committed(&ContentStatePlan::for_state("P2"), "PhaseFlow/B");
        assert_eq!(
            decision,
            CommitDecision::Deferred {
                superseded: Some(s1.signature())
            }
        );

        h.env.token_active.store(false, Ordering::SeqCst);
        assert_eq!(
            h.bridge.on_swap_completed(&completed(&s1)),
            CompletionDecision::Discarded
        );
        h.tasks.drain().await;
        assert!(h.intro.contexts().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn active_swap_leaving_gameplay_does_not_defer() {
        let h = harness(FlowScope::Level);
        h.env.set_current_scene("Menu");
        h.signatures.record_started(&SwapRequest::new(
            vec!["Menu".to_string()],
            vec!["Gameplay".to_string()],
            "Menu",
        ));
        h.env.token_active.store(true, Ordering::SeqCst);

        let decision = h
            .bridge
            .on_committed(&ContentStatePlan::for_state("L1"), "LevelFlow/Exit");
        assert_eq!(decision, CommitDecision::RunNow);
        h.tasks.drain().await;
    }
}
