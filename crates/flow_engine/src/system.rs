use std::sync::Arc;

use tracing::{debug, info};

use crate::bridge::{BridgeCollaborators, CorrelationBridge, SwapCompleted};
use crate::channel::EventChannel;
use crate::collaborators::{
    ConcurrencyTokenService, EnvironmentSwapService, GameLoopService, IntroSequenceCoordinator,
    LevelToRouteMapping, SceneClassifier, WorldResetService,
};
use crate::config::FlowConfig;
use crate::error::FlowError;
use crate::gate::{ChangeOptions, ChangeOutcome, GateCollaborators, RequestGate};
use crate::intent::{CheckpointBridge, IntentRegistry, ResetCompleted};
use crate::navigation::{NavigationCatalog, NavigationService, RouteResolver};
use crate::pipeline::ContentStartPipeline;
use crate::plan::{ContentStatePlan, FlowScope};
use crate::session::{LevelSession, SessionCache};
use crate::signature::{SignatureCache, SwapRequest};
use crate::store::{PendingStateEvent, PendingStateEventKind, PendingStateStore};
use crate::tasks::BackgroundTasks;

/// Everything the core consumes from the host. `intro` and `route_mapping`
/// may be absent; the core degrades instead of failing.
pub struct Collaborators {
    pub environment_swap: Arc<dyn EnvironmentSwapService>,
    pub world_reset: Arc<dyn WorldResetService>,
    pub tokens: Arc<dyn ConcurrencyTokenService>,
    pub game_loop: Arc<dyn GameLoopService>,
    pub scenes: Arc<dyn SceneClassifier>,
    pub intro: Option<Arc<dyn IntroSequenceCoordinator>>,
    pub route_mapping: Option<Arc<dyn LevelToRouteMapping>>,
}

/// Channels the host publishes into: reset safe points and swap completions.
#[derive(Debug, Clone)]
pub struct FlowChannels {
    pub reset_completed: Arc<EventChannel<ResetCompleted>>,
    pub swap_completed: Arc<EventChannel<SwapCompleted>>,
}

impl Default for FlowChannels {
    fn default() -> Self {
        Self {
            reset_completed: Arc::new(EventChannel::new("reset_completed")),
            swap_completed: Arc::new(EventChannel::new("swap_completed")),
        }
    }
}

pub struct ContentFlow {
    gate: Arc<RequestGate>,
    bridge: Arc<CorrelationBridge>,
}

impl ContentFlow {
    pub fn scope(&self) -> FlowScope {
        self.gate.scope()
    }

    pub fn store(&self) -> &Arc<PendingStateStore> {
        self.gate.store()
    }

    pub fn gate(&self) -> &Arc<RequestGate> {
        &self.gate
    }

    pub fn bridge(&self) -> &Arc<CorrelationBridge> {
        &self.bridge
    }

    pub async fn request_change_in_place(
        &self,
        plan: ContentStatePlan,
        reason: &str,
        options: ChangeOptions,
    ) -> Result<ChangeOutcome, FlowError> {
        self.gate
            .request_change_in_place(plan, reason, options)
            .await
    }

    pub async fn request_change_with_swap(
        &self,
        plan: ContentStatePlan,
        swap_request: SwapRequest,
        reason: &str,
        options: ChangeOptions,
    ) -> Result<ChangeOutcome, FlowError> {
        self.gate
            .request_change_with_swap(plan, swap_request, reason, options)
            .await
    }
}

pub struct FlowSystem {
    channels: FlowChannels,
    signatures: Arc<SignatureCache>,
    intents: Arc<IntentRegistry>,
    tasks: Arc<BackgroundTasks>,
    pipeline: Arc<ContentStartPipeline>,
    level: ContentFlow,
    phase: ContentFlow,
    navigation: Arc<NavigationService>,
    session: LevelSession,
}

impl FlowSystem {
    pub fn new(
        config: FlowConfig,
        collaborators: Collaborators,
        catalog: NavigationCatalog,
    ) -> Self {
        let config = config.normalized();
        let channels = FlowChannels::default();
        let signatures = Arc::new(SignatureCache::default());
        let intents = Arc::new(IntentRegistry::default());
        let tasks = Arc::new(BackgroundTasks::default());
        let pipeline = Arc::new(ContentStartPipeline::new(
            config.clone(),
            Arc::clone(&collaborators.game_loop),
            collaborators.intro.clone(),
        ));

        let build_flow = |scope: FlowScope, name: &'static str| {
            let store = Arc::new(PendingStateStore::new(scope));
            let gate = Arc::new(RequestGate::new(
                &config,
                Arc::clone(&store),
                GateCollaborators {
                    world_reset: Arc::clone(&collaborators.world_reset),
                    environment_swap: Arc::clone(&collaborators.environment_swap),
                    intents: Arc::clone(&intents),
                    signatures: Arc::clone(&signatures),
                },
            ));
            let bridge = CorrelationBridge::new(
                name,
                scope,
                config.clone(),
                BridgeCollaborators {
                    tokens: Arc::clone(&collaborators.tokens),
                    scenes: Arc::clone(&collaborators.scenes),
                    signatures: Arc::clone(&signatures),
                    pipeline: Arc::clone(&pipeline),
                    tasks: Arc::clone(&tasks),
                },
            );
            bridge.attach(store.events(), &channels.swap_completed);
            ContentFlow { gate, bridge }
        };
        let level = build_flow(FlowScope::Level, "level_bridge");
        let phase = build_flow(FlowScope::Phase, "phase_bridge");

        let checkpoint = CheckpointBridge::new(
            Arc::clone(&intents),
            Arc::clone(level.store()),
            Arc::clone(phase.store()),
        );
        checkpoint.attach(&channels.reset_completed);

        // Subscribed after both bridges so they observe the swap first.
        let completed_signatures = Arc::clone(&signatures);
        channels
            .swap_completed
            .subscribe(move |event: &SwapCompleted| {
                if completed_signatures.clear_if(&event.signature()) {
                    debug!(signature = %event.signature(), "signature_cache_cleared");
                }
            });

        let session_cache = Arc::new(SessionCache::default());
        let commit_cache = Arc::clone(&session_cache);
        level
            .store()
            .events()
            .subscribe(move |event: &PendingStateEvent| {
                if event.kind == PendingStateEventKind::Committed {
                    commit_cache.record_commit(&event.plan, &event.reason);
                }
            });

        let catalog = Arc::new(catalog);
        let resolver = Arc::new(RouteResolver::new(
            Arc::clone(&catalog),
            Arc::clone(&session_cache),
            collaborators.route_mapping.clone(),
        ));
        let navigation = Arc::new(NavigationService::new(
            resolver,
            Arc::clone(&session_cache),
            Arc::clone(&collaborators.environment_swap),
            Arc::clone(&signatures),
            Some(Arc::clone(level.gate())),
        ));
        let session = LevelSession::new(
            session_cache,
            catalog,
            collaborators.route_mapping,
            Arc::clone(&navigation),
        );

        info!(
            routes = session_routes(&navigation),
            has_intro = collaborators.intro.is_some(),
            "flow_system_ready"
        );

        Self {
            channels,
            signatures,
            intents,
            tasks,
            pipeline,
            level,
            phase,
            navigation,
            session,
        }
    }

    pub fn channels(&self) -> &FlowChannels {
        &self.channels
    }

    pub fn level(&self) -> &ContentFlow {
        &self.level
    }

    pub fn phase(&self) -> &ContentFlow {
        &self.phase
    }

    pub fn flow(&self, scope: FlowScope) -> &ContentFlow {
        match scope {
            FlowScope::Level => &self.level,
            FlowScope::Phase => &self.phase,
        }
    }

    pub fn navigation(&self) -> &Arc<NavigationService> {
        &self.navigation
    }

    pub fn session(&self) -> &LevelSession {
        &self.session
    }

    pub fn intents(&self) -> &Arc<IntentRegistry> {
        &self.intents
    }

    pub fn signatures(&self) -> &Arc<SignatureCache> {
        &self.signatures
    }

    pub fn pipeline(&self) -> &Arc<ContentStartPipeline> {
        &self.pipeline
    }

    /// Awaits every background pipeline and correlation task spawned so far.
    /// Returns the number of tasks that panicked.
    pub async fn settle(&self) -> usize {
        self.tasks.drain().await
    }
}

fn session_routes(navigation: &NavigationService) -> usize {
    navigation.resolver().catalog().routes.len()
}
