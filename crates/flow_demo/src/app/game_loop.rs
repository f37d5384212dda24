use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use flow_engine::{
    CollaboratorError, GameLoopService, GameLoopState, IntroContext, IntroSequenceCoordinator,
};
use tracing::{debug, info};

use super::locks::lock_or_recover;

const INTRO_DURATION: Duration = Duration::from_millis(150);

#[derive(Debug)]
pub(crate) struct SimulatedGameLoop {
    state: Mutex<GameLoopState>,
}

impl Default for SimulatedGameLoop {
    fn default() -> Self {
        Self {
            state: Mutex::new(GameLoopState::Boot),
        }
    }
}

impl SimulatedGameLoop {
    fn lock_state(&self) -> MutexGuard<'_, GameLoopState> {
        lock_or_recover(&self.state, "game_loop.state")
    }

    fn set_state(&self, next: GameLoopState) {
        let mut state = self.lock_state();
        if *state != next {
            debug!(from = ?*state, to = ?next, "game_loop_state_changed");
            *state = next;
        }
    }

    pub(crate) fn finish_boot(&self) {
        let mut state = self.lock_state();
        if *state == GameLoopState::Boot {
            *state = GameLoopState::Ready;
            info!("game_loop_booted");
        }
    }

    pub(crate) fn begin_play(&self) {
        self.set_state(GameLoopState::Playing);
    }

    pub(crate) fn pause(&self) {
        let mut state = self.lock_state();
        if *state == GameLoopState::Playing {
            *state = GameLoopState::Paused;
        }
    }
}

impl GameLoopService for SimulatedGameLoop {
    fn state(&self) -> GameLoopState {
        *self.lock_state()
    }

    fn request_ready(&self) {
        let mut state = self.lock_state();
        if matches!(*state, GameLoopState::Playing | GameLoopState::Paused) {
            debug!(from = ?*state, "game_loop_ready_requested");
            *state = GameLoopState::Ready;
        }
    }
}

/// Plays a short intro banner, then hands control to the player.
pub(crate) struct IntroBanner {
    game_loop: Arc<SimulatedGameLoop>,
    plays: AtomicU64,
}

impl IntroBanner {
    pub(crate) fn new(game_loop: Arc<SimulatedGameLoop>) -> Self {
        Self {
            game_loop,
            plays: AtomicU64::new(0),
        }
    }

    pub(crate) fn plays(&self) -> u64 {
        self.plays.load(Ordering::Acquire)
    }
}

#[async_trait]
impl IntroSequenceCoordinator for IntroBanner {
    async fn run(&self, context: IntroContext) -> Result<(), CollaboratorError> {
        if context.target_environment.trim().is_empty() {
            return Err(CollaboratorError::new("intro", "no target environment"));
        }
        info!(
            target = %context.target_environment,
            profile = %context.profile,
            signature = %context.signature.short(),
            "intro_started"
        );
        tokio::time::sleep(INTRO_DURATION).await;
        self.plays.fetch_add(1, Ordering::AcqRel);
        self.game_loop.begin_play();
        info!(target = %context.target_environment, "intro_finished");
        Ok(())
    }
}
