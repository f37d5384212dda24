use serde::{Deserialize, Serialize};

use crate::error::NavigationError;
use crate::signature::{SwapRequest, TransitionStyle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationIntent {
    Menu,
    GameplayStart,
    Restart,
}

impl NavigationIntent {
    pub fn as_str(self) -> &'static str {
        match self {
            NavigationIntent::Menu => "menu",
            NavigationIntent::GameplayStart => "gameplay_start",
            NavigationIntent::Restart => "restart",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteEntry {
    pub route_id: String,
    pub scenes_to_load: Vec<String>,
    #[serde(default)]
    pub scenes_to_unload: Vec<String>,
    pub active_scene: String,
    #[serde(default)]
    pub style: TransitionStyle,
    #[serde(default)]
    pub profile: String,
}

impl RouteEntry {
    pub fn swap_request(&self) -> SwapRequest {
        SwapRequest::new(
            self.scenes_to_load.clone(),
            self.scenes_to_unload.clone(),
            self.active_scene.clone(),
        )
        .with_style(self.style.clone())
        .with_profile(self.profile.clone())
    }

    pub fn swap_request_with_style(&self, style_id: Option<&str>) -> SwapRequest {
        let mut request = self.swap_request();
        if let Some(style_id) = style_id.map(str::trim).filter(|id| !id.is_empty()) {
            request.style.style_id = style_id.to_string();
        }
        request
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationCatalog {
    #[serde(default)]
    pub menu_route: Option<String>,
    #[serde(default)]
    pub gameplay_route: Option<String>,
    pub routes: Vec<RouteEntry>,
}

impl NavigationCatalog {
    pub fn route(&self, route_id: &str) -> Option<&RouteEntry> {
        let route_id = route_id.trim();
        if route_id.is_empty() {
            return None;
        }
        self.routes.iter().find(|entry| entry.route_id == route_id)
    }

    pub fn require_route(&self, route_id: &str) -> Result<&RouteEntry, NavigationError> {
        self.route(route_id)
            .ok_or_else(|| NavigationError::UnknownRoute {
                route_id: route_id.to_string(),
            })
    }

    pub fn core_route(&self, intent: NavigationIntent) -> Result<&RouteEntry, NavigationError> {
        let registered = match intent {
            NavigationIntent::Menu => self.menu_route.as_deref(),
            NavigationIntent::GameplayStart => self.gameplay_route.as_deref(),
            NavigationIntent::Restart => None,
        };
        let route_id = registered
            .filter(|route_id| !route_id.trim().is_empty())
            .ok_or(NavigationError::MissingCoreIntent {
                intent: intent.as_str(),
            })?;
        self.require_route(route_id)
    }
}
