use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::bridge::SwapCompleted;
use crate::channel::EventChannel;
use crate::collaborators::{
    CollaboratorError, ConcurrencyTokenService, EnvironmentSwapService, GameLoopService,
    GameLoopState, IntroContext, IntroSequenceCoordinator, LevelToRouteMapping, Lookup,
    SceneClassifier, WorldResetService,
};
use crate::intent::ResetCompleted;
use crate::signature::SwapRequest;

pub(crate) struct EnvironmentHooks {
    pub resets: Arc<EventChannel<ResetCompleted>>,
    pub completions: Arc<EventChannel<SwapCompleted>>,
}

/// In-memory environment: swap service, token service and scene classifier.
pub(crate) struct FakeEnvironment {
    pub transitions: AtomicUsize,
    pub fail_next: AtomicBool,
    pub token_active: AtomicBool,
    pub release_token_late: AtomicBool,
    current_scene: Mutex<String>,
    gameplay_scenes: Mutex<HashSet<String>>,
    requests: Mutex<Vec<SwapRequest>>,
    hooks: Mutex<Option<EnvironmentHooks>>,
}

impl FakeEnvironment {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            transitions: AtomicUsize::new(0),
            fail_next: AtomicBool::new(false),
            token_active: AtomicBool::new(false),
            release_token_late: AtomicBool::new(false),
            current_scene: Mutex::new("Boot".to_string()),
            gameplay_scenes: Mutex::new(HashSet::from(["Gameplay".to_string()])),
            requests: Mutex::new(Vec::new()),
            hooks: Mutex::new(None),
        })
    }

    pub fn gameplay_request() -> SwapRequest {
        SwapRequest::new(
            vec!["Gameplay".to_string(), "HUD".to_string()],
            vec!["Menu".to_string()],
            "Gameplay",
        )
    }

    pub fn menu_request() -> SwapRequest {
        SwapRequest::new(
            vec!["Menu".to_string()],
            vec!["Gameplay".to_string(), "HUD".to_string()],
            "Menu",
        )
    }

    pub fn connect(&self, hooks: EnvironmentHooks) {
        *self.hooks.lock().expect("hooks") = Some(hooks);
    }

    pub fn set_current_scene(&self, scene: &str) {
        *self.current_scene.lock().expect("scene") = scene.to_string();
    }

    pub fn set_gameplay_scenes(&self, scenes: &[&str]) {
        *self.gameplay_scenes.lock().expect("gameplay scenes") =
            scenes.iter().map(ToString::to_string).collect();
    }

    pub fn requests(&self) -> Vec<SwapRequest> {
        self.requests.lock().expect("requests").clone()
    }

    fn publishers(
        &self,
    ) -> Option<(
        Arc<EventChannel<ResetCompleted>>,
        Arc<EventChannel<SwapCompleted>>,
    )> {
        self.hooks
            .lock()
            .expect("hooks")
            .as_ref()
            .map(|hooks| (Arc::clone(&hooks.resets), Arc::clone(&hooks.completions)))
    }
}

#[async_trait]
impl EnvironmentSwapService for FakeEnvironment {
    async fn transition(&self, request: &SwapRequest) -> Result<(), CollaboratorError> {
        self.transitions.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().expect("requests").push(request.clone());
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(CollaboratorError::new("environment_swap", "scene load failed"));
        }

        self.token_active.store(true, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.set_current_scene(&request.target_active_scene);
        let publishers = self.publishers();
        if let Some((resets, _)) = publishers.as_ref() {
            resets.publish(&ResetCompleted {
                context_signature: request.signature(),
                reason: "environment swap".to_string(),
            });
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        let completion = SwapCompleted {
            request: request.clone(),
        };
        if self.release_token_late.load(Ordering::SeqCst) {
            if let Some((_, completions)) = publishers.as_ref() {
                completions.publish(&completion);
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
            self.token_active.store(false, Ordering::SeqCst);
        } else {
            self.token_active.store(false, Ordering::SeqCst);
            if let Some((_, completions)) = publishers.as_ref() {
                completions.publish(&completion);
            }
        }
        Ok(())
    }
}

impl ConcurrencyTokenService for FakeEnvironment {
    fn is_token_active(&self, _token_id: &str) -> bool {
        self.token_active.load(Ordering::SeqCst)
    }
}

impl SceneClassifier for FakeEnvironment {
    fn current_environment(&self) -> String {
        self.current_scene.lock().expect("scene").clone()
    }

    fn is_current_environment_gameplay(&self) -> bool {
        let current = self.current_environment();
        self.is_gameplay_scene(&current)
    }

    fn is_gameplay_scene(&self, scene: &str) -> bool {
        self.gameplay_scenes
            .lock()
            .expect("gameplay scenes")
            .contains(scene)
    }
}

pub(crate) struct FakeWorldReset {
    pub calls: AtomicUsize,
    pub fail_next: AtomicBool,
    delay: Duration,
    reasons: Mutex<Vec<String>>,
}

impl FakeWorldReset {
    pub fn new() -> Arc<Self> {
        Self::with_delay(Duration::ZERO)
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail_next: AtomicBool::new(false),
            delay,
            reasons: Mutex::new(Vec::new()),
        })
    }

    pub fn reasons(&self) -> Vec<String> {
        self.reasons.lock().expect("reasons").clone()
    }
}

#[async_trait]
impl WorldResetService for FakeWorldReset {
    async fn request_reset(&self, reason: &str) -> Result<(), CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reasons.lock().expect("reasons").push(reason.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(CollaboratorError::new("world_reset", "reset aborted"));
        }
        Ok(())
    }
}

pub(crate) struct FakeGameLoop {
    pub ready_requests: AtomicUsize,
    state: Mutex<GameLoopState>,
    ready_on_request: bool,
}

impl FakeGameLoop {
    pub fn new(state: GameLoopState, ready_on_request: bool) -> Arc<Self> {
        Arc::new(Self {
            ready_requests: AtomicUsize::new(0),
            state: Mutex::new(state),
            ready_on_request,
        })
    }
}

impl GameLoopService for FakeGameLoop {
    fn state(&self) -> GameLoopState {
        *self.state.lock().expect("loop state")
    }

    fn request_ready(&self) {
        self.ready_requests.fetch_add(1, Ordering::SeqCst);
        if self.ready_on_request {
            *self.state.lock().expect("loop state") = GameLoopState::Ready;
        }
    }
}

pub(crate) struct FakeIntro {
    pub fail_next: AtomicBool,
    contexts: Mutex<Vec<IntroContext>>,
}

impl FakeIntro {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            fail_next: AtomicBool::new(false),
            contexts: Mutex::new(Vec::new()),
        })
    }

    pub fn contexts(&self) -> Vec<IntroContext> {
        self.contexts.lock().expect("contexts").clone()
    }
}

#[async_trait]
impl IntroSequenceCoordinator for FakeIntro {
    async fn run(&self, context: IntroContext) -> Result<(), CollaboratorError> {
        self.contexts.lock().expect("contexts").push(context);
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(CollaboratorError::new("intro", "intro crashed"));
        }
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakeMapping {
    pub route_lookups: AtomicUsize,
    level_routes: HashMap<String, Vec<String>>,
}

impl FakeMapping {
    pub fn with(pairs: &[(&str, &str)]) -> Arc<Self> {
        let mut level_routes = HashMap::<String, Vec<String>>::new();
        for (level, route) in pairs {
            level_routes
                .entry(level.to_string())
                .or_default()
                .push(route.to_string());
        }
        Arc::new(Self {
            route_lookups: AtomicUsize::new(0),
            level_routes,
        })
    }
}

impl LevelToRouteMapping for FakeMapping {
    fn resolve_route(&self, level_id: &str) -> Lookup<String> {
        self.route_lookups.fetch_add(1, Ordering::SeqCst);
        match self.level_routes.get(level_id).map(Vec::as_slice) {
            None | Some([]) => Lookup::NotFound,
            Some([route]) => Lookup::Resolved(route.clone()),
            Some(routes) => Lookup::Ambiguous(routes.to_vec()),
        }
    }

    fn resolve_level(&self, route_id: &str) -> Lookup<String> {
        let mut levels = self
            .level_routes
            .iter()
            .filter(|(_, routes)| routes.iter().any(|route| route == route_id))
            .map(|(level, _)| level.clone())
            .collect::<Vec<_>>();
        levels.sort();
        match levels.len() {
            0 => Lookup::NotFound,
            1 => Lookup::Resolved(levels.remove(0)),
            _ => Lookup::Ambiguous(levels),
        }
    }
}
