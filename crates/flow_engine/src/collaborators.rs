use async_trait::async_trait;
use thiserror::Error;

use crate::signature::{SwapRequest, TransitionSignature};

pub const ENVIRONMENT_SWAP_TOKEN: &str = "flow.environment_swap";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{collaborator} failed: {message}")]
pub struct CollaboratorError {
    pub collaborator: &'static str,
    pub message: String,
}

impl CollaboratorError {
    pub fn new(collaborator: &'static str, message: impl Into<String>) -> Self {
        Self {
            collaborator,
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait EnvironmentSwapService: Send + Sync {
    async fn transition(&self, request: &SwapRequest) -> Result<(), CollaboratorError>;
}

#[async_trait]
pub trait WorldResetService: Send + Sync {
    async fn request_reset(&self, reason: &str) -> Result<(), CollaboratorError>;
}

pub trait ConcurrencyTokenService: Send + Sync {
    fn is_token_active(&self, token_id: &str) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameLoopState {
    Boot,
    Ready,
    Playing,
    Paused,
    PostGame,
}

impl GameLoopState {
    pub fn is_active_play(self) -> bool {
        matches!(self, GameLoopState::Playing)
    }

    /// States with a defined transition into `Ready`.
    pub fn is_waitable(self) -> bool {
        matches!(self, GameLoopState::Boot | GameLoopState::Playing)
    }
}

pub trait GameLoopService: Send + Sync {
    fn state(&self) -> GameLoopState;
    fn request_ready(&self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntroContext {
    pub signature: TransitionSignature,
    pub profile: String,
    pub target_environment: String,
    pub reason: String,
}

#[async_trait]
pub trait IntroSequenceCoordinator: Send + Sync {
    async fn run(&self, context: IntroContext) -> Result<(), CollaboratorError>;
}

pub trait SceneClassifier: Send + Sync {
    fn current_environment(&self) -> String;
    fn is_current_environment_gameplay(&self) -> bool;
    fn is_gameplay_scene(&self, scene: &str) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Resolved(T),
    NotFound,
    Ambiguous(Vec<T>),
}

impl<T> Lookup<T> {
    pub fn resolved(self) -> Option<T> {
        match self {
            Lookup::Resolved(value) => Some(value),
            Lookup::NotFound | Lookup::Ambiguous(_) => None,
        }
    }
}

pub trait LevelToRouteMapping: Send + Sync {
    fn resolve_route(&self, level_id: &str) -> Lookup<String>;
    fn resolve_level(&self, route_id: &str) -> Lookup<String>;
}
