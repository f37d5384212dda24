use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use flow_engine::{
    ChangeMode, Collaborators, ConcurrencyTokenService, EnvironmentSwapService, FlowConfig,
    FlowSystem, GameLoopService, IntroSequenceCoordinator, LevelToRouteMapping, SceneClassifier,
    WorldResetService,
};
use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use super::catalog_file::{
    builtin_catalog_file, load_catalog_file, CatalogFile, StaticRouteMapping,
};
use super::environment::SimulatedEnvironment;
use super::game_loop::{IntroBanner, SimulatedGameLoop};

const CATALOG_ENV_VAR: &str = "PROTOFLOW_CATALOG";
const DEFAULT_MODE_ENV_VAR: &str = "PROTOFLOW_DEFAULT_MODE";
const TOKEN_TIMEOUT_ENV_VAR: &str = "PROTOFLOW_TOKEN_TIMEOUT_MS";
const READY_TIMEOUT_ENV_VAR: &str = "PROTOFLOW_READY_TIMEOUT_MS";
const SUPPRESS_INTRO_ENV_VAR: &str = "PROTOFLOW_SUPPRESS_INTRO_TAGS";

#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("failed to read route catalog {path}: {source}")]
    ReadCatalog {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse route catalog{}: {message}", location_suffix(.at))]
    ParseCatalog { at: Option<String>, message: String },
    #[error("invalid route catalog at {at}: {message}")]
    InvalidCatalog { at: String, message: String },
}

impl ConfigError {
    pub(crate) fn invalid(at: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidCatalog {
            at: at.into(),
            message: message.into(),
        }
    }
}

fn location_suffix(at: &Option<String>) -> String {
    at.as_deref()
        .map(|at| format!(" at {at}"))
        .unwrap_or_default()
}

pub(crate) struct AppWiring {
    pub(crate) system: FlowSystem,
    pub(crate) environment: Arc<SimulatedEnvironment>,
    pub(crate) game_loop: Arc<SimulatedGameLoop>,
    pub(crate) intro: Arc<IntroBanner>,
}

pub(crate) fn build_app() -> Result<AppWiring, ConfigError> {
    init_tracing();
    info!("=== Proto Flow Startup ===");

    let config = flow_config_from(|name| std::env::var(name).ok());
    let catalog = match std::env::var(CATALOG_ENV_VAR).ok() {
        Some(path) => {
            let path = PathBuf::from(path);
            info!(path = %path.display(), "route_catalog_loading");
            load_catalog_file(&path)?
        }
        None => {
            info!("route_catalog_builtin");
            builtin_catalog_file()
        }
    };

    Ok(wire(config, catalog))
}

pub(crate) fn wire(config: FlowConfig, catalog: CatalogFile) -> AppWiring {
    let gameplay_scenes = catalog.gameplay_scenes.iter().cloned().collect();
    let environment = Arc::new(SimulatedEnvironment::new(
        "MainMenu",
        gameplay_scenes,
        &config.swap_token_id,
    ));
    let game_loop = Arc::new(SimulatedGameLoop::default());
    let intro = Arc::new(IntroBanner::new(Arc::clone(&game_loop)));
    let mapping = StaticRouteMapping::new(catalog.levels.clone());

    let system = FlowSystem::new(
        config,
        Collaborators {
            environment_swap: Arc::clone(&environment) as Arc<dyn EnvironmentSwapService>,
            world_reset: Arc::clone(&environment) as Arc<dyn WorldResetService>,
            tokens: Arc::clone(&environment) as Arc<dyn ConcurrencyTokenService>,
            game_loop: Arc::clone(&game_loop) as Arc<dyn GameLoopService>,
            scenes: Arc::clone(&environment) as Arc<dyn SceneClassifier>,
            intro: Some(Arc::clone(&intro) as Arc<dyn IntroSequenceCoordinator>),
            route_mapping: Some(Arc::new(mapping) as Arc<dyn LevelToRouteMapping>),
        },
        catalog.navigation_catalog(),
    );
    environment.connect(system.channels().clone());

    AppWiring {
        system,
        environment,
        game_loop,
        intro,
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

fn flow_config_from(lookup: impl Fn(&str) -> Option<String>) -> FlowConfig {
    let defaults = FlowConfig::default();
    FlowConfig {
        default_change_mode: parse_change_mode(lookup(DEFAULT_MODE_ENV_VAR).as_deref())
            .unwrap_or(defaults.default_change_mode),
        token_release_timeout: parse_millis(
            TOKEN_TIMEOUT_ENV_VAR,
            lookup(TOKEN_TIMEOUT_ENV_VAR).as_deref(),
        )
        .unwrap_or(defaults.token_release_timeout),
        ready_timeout: parse_millis(
            READY_TIMEOUT_ENV_VAR,
            lookup(READY_TIMEOUT_ENV_VAR).as_deref(),
        )
        .unwrap_or(defaults.ready_timeout),
        suppressed_intro_tags: lookup(SUPPRESS_INTRO_ENV_VAR)
            .map(|raw| parse_tag_list(&raw))
            .unwrap_or_else(|| defaults.suppressed_intro_tags.clone()),
        ..defaults
    }
}

fn parse_change_mode(raw: Option<&str>) -> Option<ChangeMode> {
    let value = raw?.trim();
    match value.to_ascii_lowercase().as_str() {
        "in_place" | "inplace" => Some(ChangeMode::InPlace),
        "swap" | "swap_required" => Some(ChangeMode::SwapRequired),
        _ => {
            warn!(
                var = DEFAULT_MODE_ENV_VAR,
                value,
                "invalid change mode; using default"
            );
            None
        }
    }
}

fn parse_millis(var: &'static str, raw: Option<&str>) -> Option<Duration> {
    let value = raw?.trim();
    match value.parse::<u64>() {
        Ok(millis) if millis > 0 => Some(Duration::from_millis(millis)),
        _ => {
            warn!(var, value, "invalid millisecond value; using default");
            None
        }
    }
}

fn parse_tag_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(ToString::to_string)
        .collect()
}
