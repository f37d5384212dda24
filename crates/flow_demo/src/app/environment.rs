use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use flow_engine::{
    CollaboratorError, ConcurrencyTokenService, EnvironmentSwapService, FlowChannels,
    ResetCompleted, SceneClassifier, SwapCompleted, SwapRequest, TransitionSignature,
    WorldResetService,
};
use tracing::{debug, info, warn};

use super::locks::lock_or_recover;

const SCENE_UNLOAD_TIME: Duration = Duration::from_millis(20);
const SCENE_LOAD_TIME: Duration = Duration::from_millis(30);
const FADE_TIME: Duration = Duration::from_millis(40);
const WORLD_RESET_TIME: Duration = Duration::from_millis(25);

#[derive(Debug)]
struct EnvironmentState {
    loaded: BTreeSet<String>,
    active: String,
    world_generation: u64,
}

/// Scene host for the demo. Loads and unloads named scenes, owns the swap
/// token and rebuilds the world on request.
pub(crate) struct SimulatedEnvironment {
    token_id: String,
    gameplay_scenes: HashSet<String>,
    state: Mutex<EnvironmentState>,
    swap_running: AtomicBool,
    swaps: AtomicU64,
    channels: Mutex<Option<FlowChannels>>,
}

impl SimulatedEnvironment {
    pub(crate) fn new(initial_scene: &str, gameplay_scenes: HashSet<String>, token_id: &str) -> Self {
        Self {
            token_id: token_id.to_string(),
            gameplay_scenes,
            state: Mutex::new(EnvironmentState {
                loaded: BTreeSet::from([initial_scene.to_string()]),
                active: initial_scene.to_string(),
                world_generation: 0,
            }),
            swap_running: AtomicBool::new(false),
            swaps: AtomicU64::new(0),
            channels: Mutex::new(None),
        }
    }

    pub(crate) fn connect(&self, channels: FlowChannels) {
        *self.lock_channels() = Some(channels);
    }

    pub(crate) fn active_scene(&self) -> String {
        self.lock_state().active.clone()
    }

    pub(crate) fn loaded_scenes(&self) -> Vec<String> {
        self.lock_state().loaded.iter().cloned().collect()
    }

    pub(crate) fn world_generation(&self) -> u64 {
        self.lock_state().world_generation
    }

    pub(crate) fn swap_count(&self) -> u64 {
        self.swaps.load(Ordering::Acquire)
    }

    fn lock_state(&self) -> MutexGuard<'_, EnvironmentState> {
        lock_or_recover(&self.state, "environment.state")
    }

    fn lock_channels(&self) -> MutexGuard<'_, Option<FlowChannels>> {
        lock_or_recover(&self.channels, "environment.channels")
    }

    fn rebuild_world(&self) -> u64 {
        let mut state = self.lock_state();
        state.world_generation += 1;
        state.world_generation
    }

    async fn run_swap(&self, request: &SwapRequest) -> Result<(), CollaboratorError> {
        for scene in request.scenes_to_unload.as_deref().unwrap_or_default() {
            tokio::time::sleep(SCENE_UNLOAD_TIME).await;
            if self.lock_state().loaded.remove(scene) {
                debug!(scene = %scene, "scene_unloaded");
            }
        }
        for scene in request.scenes_to_load.as_deref().unwrap_or_default() {
            tokio::time::sleep(SCENE_LOAD_TIME).await;
            if self.lock_state().loaded.insert(scene.clone()) {
                debug!(scene = %scene, "scene_loaded");
            }
        }

        let generation = {
            let mut state = self.lock_state();
            if !state.loaded.contains(&request.target_active_scene) {
                return Err(CollaboratorError::new(
                    "environment_swap",
                    format!(
                        "active scene '{}' is not loaded",
                        request.target_active_scene
                    ),
                ));
            }
            state.active = request.target_active_scene.clone();
            state.world_generation += 1;
            state.world_generation
        };
        info!(
            active = %request.target_active_scene,
            world_generation = generation,
            "environment_active_scene_set"
        );

        let channels = self.lock_channels().clone();
        if let Some(channels) = channels.as_ref() {
            channels.reset_completed.publish(&ResetCompleted {
                context_signature: request.signature(),
                reason: format!("swap to {}", request.target_active_scene),
            });
        }
        if request.style.use_fade {
            tokio::time::sleep(FADE_TIME).await;
        }
        Ok(())
    }
}

#[async_trait]
impl EnvironmentSwapService for SimulatedEnvironment {
    async fn transition(&self, request: &SwapRequest) -> Result<(), CollaboratorError> {
        if self
            .swap_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!(target = %request.target_active_scene, "environment_swap_rejected_busy");
            return Err(CollaboratorError::new(
                "environment_swap",
                "another swap is already running",
            ));
        }
        info!(
            target = %request.target_active_scene,
            signature = %request.signature().short(),
            style = %request.style.style_id,
            "environment_swap_started"
        );

        let result = self.run_swap(request).await;
        self.swap_running.store(false, Ordering::Release);
        result?;

        self.swaps.fetch_add(1, Ordering::AcqRel);
        let channels = self.lock_channels().clone();
        if let Some(channels) = channels.as_ref() {
            channels.swap_completed.publish(&SwapCompleted {
                request: request.clone(),
            });
        }
        info!(target = %request.target_active_scene, "environment_swap_completed");
        Ok(())
    }
}

#[async_trait]
impl WorldResetService for SimulatedEnvironment {
    async fn request_reset(&self, reason: &str) -> Result<(), CollaboratorError> {
        tokio::time::sleep(WORLD_RESET_TIME).await;
        let generation = self.rebuild_world();
        info!(reason, world_generation = generation, "world_reset_completed");

        let channels = self.lock_channels().clone();
        if let Some(channels) = channels.as_ref() {
            channels.reset_completed.publish(&ResetCompleted {
                context_signature: TransitionSignature::UNKNOWN,
                reason: reason.to_string(),
            });
        }
        Ok(())
    }
}

impl ConcurrencyTokenService for SimulatedEnvironment {
    fn is_token_active(&self, token_id: &str) -> bool {
        token_id == self.token_id && self.swap_running.load(Ordering::Acquire)
    }
}

impl SceneClassifier for SimulatedEnvironment {
    fn current_environment(&self) -> String {
        self.active_scene()
    }

    fn is_current_environment_gameplay(&self) -> bool {
        self.is_gameplay_scene(&self.active_scene())
    }

    fn is_gameplay_scene(&self, scene: &str) -> bool {
        self.gameplay_scenes.contains(scene)
    }
}
