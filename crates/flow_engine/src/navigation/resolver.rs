use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::collaborators::{LevelToRouteMapping, Lookup};
use crate::error::NavigationError;
use crate::session::SessionCache;
use crate::sync::lock_or_recover;

use super::catalog::{NavigationCatalog, RouteEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteSource {
    SessionSnapshot,
    LevelLookup,
    LastRoute,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRoute {
    pub route: RouteEntry,
    pub source: RouteSource,
    pub level_id: Option<String>,
    pub style_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartHistory {
    pub last_route: Option<String>,
    pub last_level: Option<String>,
}

pub struct RouteResolver {
    catalog: Arc<NavigationCatalog>,
    session: Arc<SessionCache>,
    mapping: Option<Arc<dyn LevelToRouteMapping>>,
    history: Mutex<StartHistory>,
}

impl RouteResolver {
    pub fn new(
        catalog: Arc<NavigationCatalog>,
        session: Arc<SessionCache>,
        mapping: Option<Arc<dyn LevelToRouteMapping>>,
    ) -> Self {
        Self {
            catalog,
            session,
            mapping,
            history: Mutex::new(StartHistory::default()),
        }
    }

    pub fn catalog(&self) -> &Arc<NavigationCatalog> {
        &self.catalog
    }

    pub fn history(&self) -> StartHistory {
        lock_or_recover(&self.history, "resolver.history").clone()
    }

    pub fn record_started(&self, route_id: &str, level_id: Option<&str>) {
        let mut history = lock_or_recover(&self.history, "resolver.record");
        history.last_route = Some(route_id.to_string());
        if let Some(level_id) = level_id {
            history.last_level = Some(level_id.to_string());
        }
    }

    /// Snapshot, then reverse lookup of the last started level, then the last
    /// literal route. Never falls back to a default route.
    pub fn resolve_restart(&self) -> Result<ResolvedRoute, NavigationError> {
        if let Some(snapshot) = self.session.snapshot() {
            if snapshot.is_valid() {
                if let Some(route) = self.catalog.route(&snapshot.route_id) {
                    debug!(route_id = %route.route_id, "restart_resolved_from_snapshot");
                    return Ok(ResolvedRoute {
                        route: route.clone(),
                        source: RouteSource::SessionSnapshot,
                        level_id: snapshot.level_id,
                        style_id: Some(snapshot.style_id).filter(|id| !id.is_empty()),
                    });
                }
                warn!(route_id = %snapshot.route_id, "restart_snapshot_route_unknown");
            }
        }

        let history = self.history();
        if let Some(level_id) = history.last_level.as_deref() {
            match self.lookup_route_for_level(level_id) {
                Some(route) => {
                    return Ok(ResolvedRoute {
                        route,
                        source: RouteSource::LevelLookup,
                        level_id: Some(level_id.to_string()),
                        style_id: None,
                    });
                }
                None => {
                    warn!(level_id, "restart_degraded_using_last_route");
                }
            }
        }

        if let Some(route_id) = history.last_route.as_deref() {
            if let Some(route) = self.catalog.route(route_id) {
                info!(route_id, "restart_resolved_from_last_route");
                return Ok(ResolvedRoute {
                    route: route.clone(),
                    source: RouteSource::LastRoute,
                    level_id: history.last_level.clone(),
                    style_id: None,
                });
            }
            warn!(route_id, "restart_last_route_unknown");
        }

        Err(NavigationError::RestartUnresolved)
    }

    fn lookup_route_for_level(&self, level_id: &str) -> Option<RouteEntry> {
        let Some(mapping) = self.mapping.as_ref() else {
            warn!(level_id, "restart_mapping_unavailable");
            return None;
        };
        match mapping.resolve_route(level_id) {
            Lookup::Resolved(route_id) => match self.catalog.route(&route_id) {
                Some(route) => Some(route.clone()),
                None => {
                    warn!(level_id, route_id = %route_id, "restart_mapped_route_unknown");
                    None
                }
            },
            Lookup::NotFound => {
                warn!(level_id, "restart_level_not_mapped");
                None
            }
            Lookup::Ambiguous(candidates) => {
                warn!(level_id, candidates = ?candidates, "restart_level_mapping_ambiguous");
                None
            }
        }
    }

    /// Best-effort origin level for a route. Only restart accuracy depends on
    /// it, so failure is logged and returns `None`.
    pub fn reconstruct_level(&self, route_id: &str, payload_level: Option<&str>) -> Option<String> {
        if let Some(level) = payload_level.map(str::trim).filter(|level| !level.is_empty()) {
            return Some(level.to_string());
        }
        if let Some(snapshot) = self.session.snapshot() {
            if snapshot.route_id == route_id {
                if let Some(level) = snapshot.level_id {
                    return Some(level);
                }
            }
        }
        let Some(mapping) = self.mapping.as_ref() else {
            warn!(route_id, "level_reconstruction_mapping_unavailable");
            return None;
        };
        match mapping.resolve_level(route_id) {
            Lookup::Resolved(level) => Some(level),
            Lookup::NotFound => {
                warn!(route_id, "level_reconstruction_failed");
                None
            }
            Lookup::Ambiguous(candidates) => {
                warn!(route_id, candidates = ?candidates, "level_reconstruction_ambiguous");
                None
            }
        }
    }
}
