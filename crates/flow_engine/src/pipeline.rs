use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::collaborators::{GameLoopService, GameLoopState, IntroContext, IntroSequenceCoordinator};
use crate::config::FlowConfig;
use crate::plan::{ContentStatePlan, FlowScope};
use crate::signature::TransitionSignature;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentStartRequest {
    pub scope: FlowScope,
    pub plan: ContentStatePlan,
    pub signature: TransitionSignature,
    pub profile: String,
    pub target_environment: String,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyOutcome {
    AlreadyReady,
    Reached,
    GraceElapsed,
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntroOutcome {
    Suppressed,
    Unavailable,
    Completed,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    pub ready: ReadyOutcome,
    pub intro: IntroOutcome,
}

/// Post-commit work for a freshly committed content state. Never fails the
/// caller: every collaborator problem ends up in the report and the log.
pub struct ContentStartPipeline {
    config: FlowConfig,
    game_loop: Arc<dyn GameLoopService>,
    intro: Option<Arc<dyn IntroSequenceCoordinator>>,
    runs: AtomicU64,
}

impl ContentStartPipeline {
    pub fn new(
        config: FlowConfig,
        game_loop: Arc<dyn GameLoopService>,
        intro: Option<Arc<dyn IntroSequenceCoordinator>>,
    ) -> Self {
        Self {
            config: config.normalized(),
            game_loop,
            intro,
            runs: AtomicU64::new(0),
        }
    }

    pub fn run_count(&self) -> u64 {
        self.runs.load(Ordering::Acquire)
    }

    pub async fn run(&self, request: ContentStartRequest) -> PipelineReport {
        self.runs.fetch_add(1, Ordering::AcqRel);
        info!(
            scope = ?request.scope,
            plan = %request.plan,
            signature = %request.signature,
            target = %request.target_environment,
            reason = %request.reason,
            "content_start_begin"
        );

        let ready = self.wait_for_ready().await;
        let intro = if self.config.suppresses_intro(&request.reason) {
            info!(reason = %request.reason, "content_start_intro_suppressed");
            IntroOutcome::Suppressed
        } else {
            self.run_intro(&request).await
        };

        info!(
            scope = ?request.scope,
            plan = %request.plan,
            ready = ?ready,
            intro = ?intro,
            "content_start_finished"
        );
        PipelineReport { ready, intro }
    }

    async fn wait_for_ready(&self) -> ReadyOutcome {
        let before = self.game_loop.state();
        if before == GameLoopState::Ready {
            return ReadyOutcome::AlreadyReady;
        }
        if before.is_active_play() {
            debug!(state = ?before, "content_start_requesting_ready");
            self.game_loop.request_ready();
        }

        let started = Instant::now();
        if self.poll_ready_until(started + self.config.ready_grace).await {
            return ReadyOutcome::Reached;
        }
        if !before.is_waitable() {
            debug!(
                state = ?before,
                grace_ms = self.config.ready_grace.as_millis() as u64,
                "content_start_ready_grace_elapsed"
            );
            return ReadyOutcome::GraceElapsed;
        }
        if self.poll_ready_until(started + self.config.ready_timeout).await {
            return ReadyOutcome::Reached;
        }
        warn!(
            state_before = ?before,
            state_now = ?self.game_loop.state(),
            timeout_ms = self.config.ready_timeout.as_millis() as u64,
            "content_start_ready_timeout"
        );
        ReadyOutcome::TimedOut
    }

    async fn poll_ready_until(&self, deadline: Instant) -> bool {
        loop {
            if self.game_loop.state() == GameLoopState::Ready {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let remaining = deadline.saturating_duration_since(now);
            sleep(remaining.min(self.poll_interval())).await;
        }
    }

    fn poll_interval(&self) -> Duration {
        self.config.ready_poll_interval
    }

    async fn run_intro(&self, request: &ContentStartRequest) -> IntroOutcome {
        let Some(intro) = self.intro.as_ref() else {
            debug!("content_start_no_intro_coordinator");
            return IntroOutcome::Unavailable;
        };
        let context = IntroContext {
            signature: request.signature.clone(),
            profile: request.profile.clone(),
            target_environment: request.target_environment.clone(),
            reason: request.reason.clone(),
        };
        match intro.run(context).await {
            Ok(()) => IntroOutcome::Completed,
            Err(err) => {
                error!(error = %err, reason = %request.reason, "content_start_intro_failed");
                IntroOutcome::Failed(err.to_string())
            }
        }
    }
}
