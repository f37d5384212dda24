use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::collaborators::{LevelToRouteMapping, Lookup};
use crate::error::NavigationError;
use crate::navigation::{GameplayRoutePayload, NavigationCatalog, NavigationOutcome, NavigationService};
use crate::plan::ContentStatePlan;
use crate::signature::TransitionSignature;
use crate::sync::lock_or_recover;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameplayStartSnapshot {
    pub route_id: String,
    pub level_id: Option<String>,
    pub content_id: Option<String>,
    pub content_signature: Option<String>,
    pub style_id: String,
    pub reason: String,
    pub selection_version: u64,
    pub context_signature: TransitionSignature,
}

impl GameplayStartSnapshot {
    pub fn is_valid(&self) -> bool {
        !self.route_id.trim().is_empty()
    }
}

#[derive(Debug, Default)]
struct SessionState {
    snapshot: Option<GameplayStartSnapshot>,
    selection_version: u64,
}

/// Session-wide memory of what gameplay was last selected or started.
#[derive(Debug, Default)]
pub struct SessionCache {
    state: Mutex<SessionState>,
}

impl SessionCache {
    pub fn snapshot(&self) -> Option<GameplayStartSnapshot> {
        lock_or_recover(&self.state, "session.snapshot").snapshot.clone()
    }

    pub fn selection_version(&self) -> u64 {
        lock_or_recover(&self.state, "session.version").selection_version
    }

    pub fn record_selection(
        &self,
        route_id: &str,
        level_id: &str,
        content_id: Option<&str>,
        style_id: &str,
        reason: &str,
    ) -> GameplayStartSnapshot {
        let mut state = lock_or_recover(&self.state, "session.select");
        state.selection_version = state.selection_version.saturating_add(1);
        let snapshot = GameplayStartSnapshot {
            route_id: route_id.trim().to_string(),
            level_id: non_blank(level_id),
            content_id: content_id.and_then(non_blank),
            content_signature: None,
            style_id: style_id.trim().to_string(),
            reason: reason.to_string(),
            selection_version: state.selection_version,
            context_signature: TransitionSignature::UNKNOWN,
        };
        state.snapshot = Some(snapshot.clone());
        snapshot
    }

    /// Records a gameplay start that reached its target. Content the caller
    /// does not name is carried over only from a snapshot of the same level.
    pub fn record_gameplay_start(
        &self,
        route_id: &str,
        level_id: Option<&str>,
        content_id: Option<&str>,
        style_id: &str,
        signature: &TransitionSignature,
        reason: &str,
    ) {
        let mut state = lock_or_recover(&self.state, "session.start");
        let selection_version = state.selection_version;
        let level_id = level_id.and_then(non_blank);
        let same_level = state
            .snapshot
            .as_ref()
            .filter(|previous| previous.level_id == level_id);
        let content_signature = same_level.and_then(|previous| previous.content_signature.clone());
        let content_id = content_id
            .and_then(non_blank)
            .or_else(|| same_level.and_then(|previous| previous.content_id.clone()));
        state.snapshot = Some(GameplayStartSnapshot {
            route_id: route_id.trim().to_string(),
            level_id,
            content_id,
            content_signature,
            style_id: style_id.trim().to_string(),
            reason: reason.to_string(),
            selection_version,
            context_signature: signature.clone(),
        });
    }

    /// Folds a committed level plan into the snapshot when it belongs to the
    /// snapshot's level (or the snapshot has no level yet).
    pub fn record_commit(&self, plan: &ContentStatePlan, reason: &str) -> bool {
        let mut state = lock_or_recover(&self.state, "session.commit");
        let Some(snapshot) = state.snapshot.as_mut() else {
            return false;
        };
        let matches_level = snapshot
            .level_id
            .as_deref()
            .map_or(true, |level| level == plan.state_id());
        if !matches_level {
            debug!(
                snapshot_level = ?snapshot.level_id,
                committed = %plan,
                "session_commit_for_other_level"
            );
            return false;
        }
        snapshot.level_id = Some(plan.state_id().to_string());
        if !plan.content_id().is_empty() {
            snapshot.content_id = Some(plan.content_id().to_string());
        }
        if !plan.content_signature().is_empty() {
            snapshot.content_signature = Some(plan.content_signature().to_string());
        }
        snapshot.reason = reason.to_string();
        true
    }

    pub fn clear(&self) {
        lock_or_recover(&self.state, "session.clear").snapshot = None;
    }
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// `select_level` / `apply_selected` front for menus.
pub struct LevelSession {
    cache: Arc<SessionCache>,
    catalog: Arc<NavigationCatalog>,
    mapping: Option<Arc<dyn LevelToRouteMapping>>,
    navigation: Arc<NavigationService>,
}

impl LevelSession {
    pub fn new(
        cache: Arc<SessionCache>,
        catalog: Arc<NavigationCatalog>,
        mapping: Option<Arc<dyn LevelToRouteMapping>>,
        navigation: Arc<NavigationService>,
    ) -> Self {
        Self {
            cache,
            catalog,
            mapping,
            navigation,
        }
    }

    pub fn cache(&self) -> &Arc<SessionCache> {
        &self.cache
    }

    pub fn select_level(
        &self,
        level_id: &str,
        content_id: Option<&str>,
        reason: &str,
    ) -> Result<GameplayStartSnapshot, NavigationError> {
        let level_id = level_id.trim();
        let Some(mapping) = self.mapping.as_ref() else {
            return Err(NavigationError::UnmappedLevel {
                level_id: level_id.to_string(),
                detail: "no level-to-route mapping configured".to_string(),
            });
        };
        let route_id = match mapping.resolve_route(level_id) {
            Lookup::Resolved(route_id) => route_id,
            Lookup::NotFound => {
                return Err(NavigationError::UnmappedLevel {
                    level_id: level_id.to_string(),
                    detail: "no route registered".to_string(),
                })
            }
            Lookup::Ambiguous(candidates) => {
                return Err(NavigationError::UnmappedLevel {
                    level_id: level_id.to_string(),
                    detail: format!("ambiguous routes {}", candidates.join(", ")),
                })
            }
        };
        let route = self.catalog.require_route(&route_id)?;
        let snapshot = self.cache.record_selection(
            &route.route_id,
            level_id,
            content_id,
            &route.style.style_id,
            reason,
        );
        info!(
            level_id,
            route_id = %snapshot.route_id,
            selection_version = snapshot.selection_version,
            "level_selected"
        );
        Ok(snapshot)
    }

    pub async fn apply_selected(&self, reason: &str) -> Result<NavigationOutcome, NavigationError> {
        let snapshot = self
            .cache
            .snapshot()
            .filter(GameplayStartSnapshot::is_valid)
            .ok_or(NavigationError::NothingSelected)?;
        let payload = GameplayRoutePayload {
            level_id: snapshot.level_id.clone(),
            content_id: snapshot.content_id.clone(),
            style_id: Some(snapshot.style_id.clone()),
        };
        self.navigation
            .start_gameplay_route(&snapshot.route_id, payload, reason)
            .await
    }
}
