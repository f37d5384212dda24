use std::process::ExitCode;

use flow_engine::{
    ChangeOptions, ChangeOutcome, ContentStatePlan, FlowError, NavigationError, NavigationIntent,
    NavigationOutcome,
};
use thiserror::Error;
use tracing::{error, info, warn};

use super::bootstrap::AppWiring;

#[derive(Debug, Error)]
enum SessionError {
    #[error(transparent)]
    Navigation(#[from] NavigationError),
    #[error(transparent)]
    Flow(#[from] FlowError),
}

impl SessionError {
    fn is_configuration_missing(&self) -> bool {
        match self {
            SessionError::Navigation(err) => err.is_configuration_missing(),
            SessionError::Flow(_) => false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct SessionSummary {
    steps: u32,
    pipeline_runs: u64,
    swaps: u64,
    intro_plays: u64,
    task_failures: usize,
}

pub(crate) async fn run(app: AppWiring) -> ExitCode {
    match run_session(&app).await {
        Ok(summary) => {
            info!(
                steps = summary.steps,
                pipeline_runs = summary.pipeline_runs,
                swaps = summary.swaps,
                intro_plays = summary.intro_plays,
                task_failures = summary.task_failures,
                "session_finished"
            );
            if summary.task_failures > 0 {
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(
                error = %err,
                configuration_missing = err.is_configuration_missing(),
                "session_failed"
            );
            ExitCode::FAILURE
        }
    }
}

async fn run_session(app: &AppWiring) -> Result<SessionSummary, SessionError> {
    let system = &app.system;
    let navigation = system.navigation();
    let mut summary = SessionSummary::default();
    app.game_loop.finish_boot();

    let outcome = navigation
        .navigate(NavigationIntent::Menu, "Boot/ShowMenu")
        .await?;
    step(app, &mut summary, "show_menu", &outcome).await;

    system
        .session()
        .select_level("forest-1", Some("forest-1/dawn"), "Menu/LevelSelect")?;
    let outcome = system.session().apply_selected("Menu/Play").await?;
    step(app, &mut summary, "play_forest", &outcome).await;

    let outcome = system
        .phase()
        .request_change_in_place(
            ContentStatePlan::new("wave-2", "forest-1/wave-2", ""),
            "Objective/WaveCleared",
            ChangeOptions::default(),
        )
        .await?;
    change_step(app, &mut summary, "advance_wave", &outcome).await;

    let outcome = system
        .phase()
        .request_change_in_place(
            ContentStatePlan::new("wave-3", "forest-1/wave-3", ""),
            "InPlace/QA/SkipWave",
            ChangeOptions::default(),
        )
        .await?;
    change_step(app, &mut summary, "qa_skip_wave", &outcome).await;

    app.game_loop.pause();
    let outcome = navigation.restart("Pause/Restart").await?;
    step(app, &mut summary, "restart", &outcome).await;

    system
        .session()
        .select_level("caverns-1", None, "Menu/LevelSelect")?;
    let outcome = system.session().apply_selected("Menu/Play").await?;
    step(app, &mut summary, "play_caverns", &outcome).await;

    let outcome = navigation
        .navigate(NavigationIntent::Menu, "Pause/Quit")
        .await?;
    step(app, &mut summary, "quit_to_menu", &outcome).await;

    summary.pipeline_runs = system.pipeline().run_count();
    summary.swaps = app.environment.swap_count();
    summary.intro_plays = app.intro.plays();
    Ok(summary)
}

async fn step(
    app: &AppWiring,
    summary: &mut SessionSummary,
    name: &'static str,
    outcome: &NavigationOutcome,
) {
    match outcome {
        NavigationOutcome::Completed {
            route_id, level_id, ..
        } => info!(step = name, route_id = %route_id, level_id = ?level_id, "session_step_completed"),
        NavigationOutcome::Busy | NavigationOutcome::Dropped(_) => {
            warn!(step = name, outcome = ?outcome, "session_step_skipped")
        }
    }
    settle(app, summary, name).await;
}

async fn change_step(
    app: &AppWiring,
    summary: &mut SessionSummary,
    name: &'static str,
    outcome: &ChangeOutcome,
) {
    if outcome.is_dropped() {
        warn!(step = name, outcome = ?outcome, "session_step_skipped");
    } else {
        info!(step = name, outcome = ?outcome, "session_step_completed");
    }
    settle(app, summary, name).await;
}

async fn settle(app: &AppWiring, summary: &mut SessionSummary, name: &'static str) {
    let failures = app.system.settle().await;
    summary.steps += 1;
    summary.task_failures += failures;
    info!(
        step = name,
        active_scene = %app.environment.active_scene(),
        loaded_scenes = ?app.environment.loaded_scenes(),
        world_generation = app.environment.world_generation(),
        level = %app.system.level().store().current(),
        phase = %app.system.phase().store().current(),
        "session_state"
    );
}

#[cfg(test)]
mod tests {
    use flow_engine::FlowConfig;

    use super::*;
    use crate::app::bootstrap::wire;
    use crate::app::catalog_file::builtin_catalog_file;

    #[tokio::test(start_paused = true)]
    async fn scripted_session_runs_each_content_start_once() {
        let app = wire(FlowConfig::default(), builtin_catalog_file());

        let summary = run_session(&app).await.expect("session");

        assert_eq!(summary.steps, 7);
        assert_eq!(summary.swaps, 5);
        assert_eq!(summary.pipeline_runs, 5);
        assert_eq!(summary.intro_plays, 4);
        assert_eq!(summary.task_failures, 0);
        assert_eq!(app.environment.active_scene(), "MainMenu");
        assert!(app.environment.loaded_scenes().contains(&"MainMenu".to_string()));
        assert_eq!(app.environment.world_generation(), 7);
        assert_eq!(app.system.level().store().current().state_id(), "caverns-1");
        assert_eq!(app.system.phase().store().current().state_id(), "wave-3");
    }

    #[tokio::test(start_paused = true)]
    async fn restart_replays_forest_route() {
        let app = wire(FlowConfig::default(), builtin_catalog_file());
        app.game_loop.finish_boot();
        app.system
            .session()
            .select_level("forest-1", None, "Menu/LevelSelect")
            .expect("select");
        app.system
            .session()
            .apply_selected("Menu/Play")
            .await
            .expect("play");
        app.system.settle().await;

        let outcome = app
            .system
            .navigation()
            .restart("Pause/Restart")
            .await
            .expect("restart");
        app.system.settle().await;

        assert!(matches!(
            outcome,
            NavigationOutcome::Completed { ref route_id, .. } if route_id == "to-forest"
        ));
        assert_eq!(app.environment.active_scene(), "Forest");
        assert_eq!(app.intro.plays(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_level_is_a_configuration_error() {
        let app = wire(FlowConfig::default(), builtin_catalog_file());
        let err = app
            .system
            .session()
            .select_level("moon-base", None, "Menu/LevelSelect")
            .map_err(SessionError::from)
            .expect_err("unmapped");
        assert!(err.is_configuration_missing());
    }
}
