pub mod bridge;
pub mod channel;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod gate;
pub mod intent;
pub mod navigation;
pub mod pipeline;
pub mod plan;
pub mod session;
pub mod signature;
pub mod store;
mod sync;
pub mod system;
pub mod tasks;
#[cfg(test)]
mod test_support;

pub use bridge::{
    BridgeCollaborators, CommitDecision, CompletionDecision, CompletionResult, CorrelationBridge,
    PendingCorrelation, SwapCompleted,
};
pub use channel::{EventChannel, SubscriptionId};
pub use collaborators::{
    CollaboratorError, ConcurrencyTokenService, EnvironmentSwapService, GameLoopService,
    GameLoopState, IntroContext, IntroSequenceCoordinator, LevelToRouteMapping, Lookup,
    SceneClassifier, WorldResetService, ENVIRONMENT_SWAP_TOKEN,
};
pub use config::{FlowConfig, IN_PLACE_DEV_TAG, IN_PLACE_QA_TAG};
pub use error::{FlowError, NavigationError};
pub use gate::{ChangeOptions, ChangeOutcome, DropReason, GateCollaborators, RequestGate};
pub use intent::{CheckpointBridge, DeferredIntent, IntentRegistry, ResetCompleted};
pub use navigation::{
    GameplayRoutePayload, NavigationCatalog, NavigationIntent, NavigationOutcome,
    NavigationService, ResolvedRoute, RouteEntry, RouteResolver, RouteSource, StartHistory,
};
pub use pipeline::{
    ContentStartPipeline, ContentStartRequest, IntroOutcome, PipelineReport, ReadyOutcome,
};
pub use plan::{
    ChangeMode, ContentStatePlan, FlowScope, LEVEL_REASON_PREFIX, PHASE_REASON_PREFIX,
};
pub use session::{GameplayStartSnapshot, LevelSession, SessionCache};
pub use signature::{
    SignatureCache, StartedSwap, SwapRequest, TransitionSignature, TransitionStyle,
};
pub use store::{PendingStateEvent, PendingStateEventKind, PendingStateStore};
pub use system::{Collaborators, ContentFlow, FlowChannels, FlowSystem};
pub use tasks::BackgroundTasks;
