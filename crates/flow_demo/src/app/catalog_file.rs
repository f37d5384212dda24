use std::collections::HashSet;
use std::fs;
use std::path::Path;

use flow_engine::{
    LevelToRouteMapping, Lookup, NavigationCatalog, NavigationIntent, RouteEntry, TransitionStyle,
};
use serde::{Deserialize, Serialize};

use super::bootstrap::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct LevelRoute {
    pub(crate) level_id: String,
    pub(crate) route_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct CatalogFile {
    #[serde(default)]
    pub(crate) menu_route: Option<String>,
    #[serde(default)]
    pub(crate) gameplay_route: Option<String>,
    pub(crate) routes: Vec<RouteEntry>,
    #[serde(default)]
    pub(crate) levels: Vec<LevelRoute>,
    #[serde(default)]
    pub(crate) gameplay_scenes: Vec<String>,
}

impl CatalogFile {
    pub(crate) fn navigation_catalog(&self) -> NavigationCatalog {
        NavigationCatalog {
            menu_route: self.menu_route.clone(),
            gameplay_route: self.gameplay_route.clone(),
            routes: self.routes.clone(),
        }
    }
}

pub(crate) fn load_catalog_file(path: &Path) -> Result<CatalogFile, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::ReadCatalog {
        path: path.to_path_buf(),
        source,
    })?;
    let file = parse_catalog_json(&raw)?;
    validate_catalog_file(&file)?;
    Ok(file)
}

fn parse_catalog_json(raw: &str) -> Result<CatalogFile, ConfigError> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    serde_path_to_error::deserialize::<_, CatalogFile>(&mut deserializer).map_err(|error| {
        let path = error.path().to_string();
        let message = error.into_inner().to_string();
        ConfigError::ParseCatalog {
            at: if path.is_empty() || path == "." {
                None
            } else {
                Some(path)
            },
            message,
        }
    })
}

fn validate_catalog_file(file: &CatalogFile) -> Result<(), ConfigError> {
    let catalog = file.navigation_catalog();
    let mut seen = HashSet::with_capacity(catalog.routes.len());
    for (index, route) in catalog.routes.iter().enumerate() {
        if route.route_id.trim().is_empty() {
            return Err(ConfigError::invalid(
                format!("routes[{index}].route_id"),
                "route id must not be blank",
            ));
        }
        if route.scenes_to_load.is_empty() || route.active_scene.trim().is_empty() {
            return Err(ConfigError::invalid(
                format!("routes[{index}]"),
                "route needs scenes_to_load and an active_scene",
            ));
        }
        if !seen.insert(route.route_id.as_str()) {
            return Err(ConfigError::invalid(
                format!("routes[{index}].route_id"),
                format!("duplicate route id '{}'", route.route_id),
            ));
        }
    }

    for intent in [NavigationIntent::Menu, NavigationIntent::GameplayStart] {
        catalog
            .core_route(intent)
            .map_err(|error| ConfigError::invalid(intent.as_str(), error.to_string()))?;
    }

    for (index, level) in file.levels.iter().enumerate() {
        if level.level_id.trim().is_empty() {
            return Err(ConfigError::invalid(
                format!("levels[{index}].level_id"),
                "level id must not be blank",
            ));
        }
        if catalog.route(&level.route_id).is_none() {
            return Err(ConfigError::invalid(
                format!("levels[{index}].route_id"),
                format!("unknown route '{}'", level.route_id),
            ));
        }
    }
    Ok(())
}

pub(crate) fn builtin_catalog_file() -> CatalogFile {
    let gameplay_route = |route_id: &str, scene: &str, style_id: &str| RouteEntry {
        route_id: route_id.to_string(),
        scenes_to_load: vec![scene.to_string(), "Hud".to_string()],
        scenes_to_unload: vec!["MainMenu".to_string()],
        active_scene: scene.to_string(),
        style: TransitionStyle {
            style_id: style_id.to_string(),
            use_fade: true,
        },
        profile: "gameplay".to_string(),
    };
    CatalogFile {
        menu_route: Some("to-menu".to_string()),
        gameplay_route: Some("to-forest".to_string()),
        routes: vec![
            RouteEntry {
                route_id: "to-menu".to_string(),
                scenes_to_load: vec!["MainMenu".to_string()],
                scenes_to_unload: vec![
                    "Forest".to_string(),
                    "Caverns".to_string(),
                    "Hud".to_string(),
                ],
                active_scene: "MainMenu".to_string(),
                style: TransitionStyle::default(),
                profile: "frontend".to_string(),
            },
            gameplay_route("to-forest", "Forest", "fade"),
            gameplay_route("to-caverns", "Caverns", "iris"),
        ],
        levels: vec![
            LevelRoute {
                level_id: "forest-1".to_string(),
                route_id: "to-forest".to_string(),
            },
            LevelRoute {
                level_id: "caverns-1".to_string(),
                route_id: "to-caverns".to_string(),
            },
        ],
        gameplay_scenes: vec!["Forest".to_string(), "Caverns".to_string()],
    }
}

/// Level-to-route table read from the catalog file.
#[derive(Debug, Clone, Default)]
pub(crate) struct StaticRouteMapping {
    levels: Vec<LevelRoute>,
}

impl StaticRouteMapping {
    pub(crate) fn new(levels: Vec<LevelRoute>) -> Self {
        Self { levels }
    }
}

impl LevelToRouteMapping for StaticRouteMapping {
    fn resolve_route(&self, level_id: &str) -> Lookup<String> {
        collect_lookup(
            self.levels
                .iter()
                .filter(|entry| entry.level_id == level_id)
                .map(|entry| entry.route_id.clone()),
        )
    }

    fn resolve_level(&self, route_id: &str) -> Lookup<String> {
        collect_lookup(
            self.levels
                .iter()
                .filter(|entry| entry.route_id == route_id)
                .map(|entry| entry.level_id.clone()),
        )
    }
}

fn collect_lookup(matches: impl Iterator<Item = String>) -> Lookup<String> {
    let mut found = matches.collect::<Vec<_>>();
    found.sort();
    found.dedup();
    match found.len() {
        0 => Lookup::NotFound,
        1 => Lookup::Resolved(found.remove(0)),
        _ => Lookup::Ambiguous(found),
    }
}
