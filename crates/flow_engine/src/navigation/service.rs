use std::sync::Arc;

use tracing::{error, info, warn};

use crate::collaborators::EnvironmentSwapService;
use crate::error::NavigationError;
use crate::gate::{ChangeOptions, ChangeOutcome, DropReason, RequestGate};
use crate::plan::ContentStatePlan;
use crate::session::SessionCache;
use crate::signature::{SignatureCache, SwapRequest, TransitionSignature};
use crate::sync::InFlightFlag;

use super::catalog::{NavigationIntent, RouteEntry};
use super::resolver::RouteResolver;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GameplayRoutePayload {
    pub level_id: Option<String>,
    pub content_id: Option<String>,
    pub style_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationOutcome {
    Completed {
        route_id: String,
        signature: TransitionSignature,
        level_id: Option<String>,
    },
    Busy,
    Dropped(DropReason),
}

pub struct NavigationService {
    resolver: Arc<RouteResolver>,
    session: Arc<SessionCache>,
    environment_swap: Arc<dyn EnvironmentSwapService>,
    signatures: Arc<SignatureCache>,
    level_gate: Option<Arc<RequestGate>>,
    in_flight: InFlightFlag,
}

impl NavigationService {
    pub fn new(
        resolver: Arc<RouteResolver>,
        session: Arc<SessionCache>,
        environment_swap: Arc<dyn EnvironmentSwapService>,
        signatures: Arc<SignatureCache>,
        level_gate: Option<Arc<RequestGate>>,
    ) -> Self {
        Self {
            resolver,
            session,
            environment_swap,
            signatures,
            level_gate,
            in_flight: InFlightFlag::default(),
        }
    }

    pub fn resolver(&self) -> &Arc<RouteResolver> {
        &self.resolver
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_set()
    }

    pub async fn navigate(
        &self,
        intent: NavigationIntent,
        reason: &str,
    ) -> Result<NavigationOutcome, NavigationError> {
        let Some(_in_flight) = self.in_flight.try_acquire() else {
            warn!(intent = intent.as_str(), reason, "navigation_dropped_in_flight");
            return Ok(NavigationOutcome::Busy);
        };
        info!(intent = intent.as_str(), reason, "navigation_requested");

        match intent {
            NavigationIntent::Menu => {
                let route = self.resolver.catalog().core_route(intent)?.clone();
                let request = route.swap_request();
                let signature = self.run_swap(&route.route_id, &request).await?;
                Ok(NavigationOutcome::Completed {
                    route_id: route.route_id,
                    signature,
                    level_id: None,
                })
            }
            NavigationIntent::GameplayStart => {
                let route = self.resolver.catalog().core_route(intent)?.clone();
                self.start_gameplay(route, GameplayRoutePayload::default(), reason)
                    .await
            }
            NavigationIntent::Restart => {
                let resolved = self.resolver.resolve_restart()?;
                info!(
                    route_id = %resolved.route.route_id,
                    source = ?resolved.source,
                    "restart_route_resolved"
                );
                let content_id = self
                    .session
                    .snapshot()
                    .filter(|snapshot| snapshot.level_id == resolved.level_id)
                    .and_then(|snapshot| snapshot.content_id);
                let payload = GameplayRoutePayload {
                    level_id: resolved.level_id,
                    content_id,
                    style_id: resolved.style_id,
                };
                self.start_gameplay(resolved.route, payload, reason).await
            }
        }
    }

    pub async fn restart(&self, reason: &str) -> Result<NavigationOutcome, NavigationError> {
        self.navigate(NavigationIntent::Restart, reason).await
    }

    pub async fn start_gameplay_route(
        &self,
        route_id: &str,
        payload: GameplayRoutePayload,
        reason: &str,
    ) -> Result<NavigationOutcome, NavigationError> {
        let Some(_in_flight) = self.in_flight.try_acquire() else {
            warn!(route_id, reason, "navigation_dropped_in_flight");
            return Ok(NavigationOutcome::Busy);
        };
        let route = self.resolver.catalog().require_route(route_id)?.clone();
        self.start_gameplay(route, payload, reason).await
    }

    async fn start_gameplay(
        &self,
        route: RouteEntry,
        payload: GameplayRoutePayload,
        reason: &str,
    ) -> Result<NavigationOutcome, NavigationError> {
        let level_id = self
            .resolver
            .reconstruct_level(&route.route_id, payload.level_id.as_deref());
        let request = route.swap_request_with_style(payload.style_id.as_deref());
        let style_id = request.style.style_id.clone();

        let outcome = match (self.level_gate.as_ref(), level_id.as_deref()) {
            (Some(gate), Some(level)) => {
                let signature = request.signature();
                let plan = ContentStatePlan::new(
                    level,
                    payload.content_id.as_deref().unwrap_or_default(),
                    "",
                );
                let outcome = gate
                    .request_change_with_swap(plan, request, reason, ChangeOptions::default())
                    .await
                    .map_err(|source| NavigationError::ContentChange {
                        route_id: route.route_id.clone(),
                        source,
                    })?;
                match outcome {
                    ChangeOutcome::Dropped(DropReason::Busy) => NavigationOutcome::Busy,
                    ChangeOutcome::Dropped(dropped) => NavigationOutcome::Dropped(dropped),
                    ChangeOutcome::SwapFinished { .. } | ChangeOutcome::AppliedInPlace { .. } => {
                        NavigationOutcome::Completed {
                            route_id: route.route_id.clone(),
                            signature,
                            level_id: level_id.clone(),
                        }
                    }
                }
            }
            _ => {
                let signature = self.run_swap(&route.route_id, &request).await?;
                NavigationOutcome::Completed {
                    route_id: route.route_id.clone(),
                    signature,
                    level_id: level_id.clone(),
                }
            }
        };

        match &outcome {
            NavigationOutcome::Completed { signature, .. } => {
                self.resolver
                    .record_started(&route.route_id, level_id.as_deref());
                self.session.record_gameplay_start(
                    &route.route_id,
                    level_id.as_deref(),
                    payload.content_id.as_deref(),
                    &style_id,
                    signature,
                    reason,
                );
            }
            NavigationOutcome::Busy | NavigationOutcome::Dropped(_) => {
                warn!(
                    route_id = %route.route_id,
                    outcome = ?outcome,
                    "gameplay_start_not_recorded"
                );
            }
        }
        Ok(outcome)
    }

    async fn run_swap(
        &self,
        route_id: &str,
        request: &SwapRequest,
    ) -> Result<TransitionSignature, NavigationError> {
        let signature = self.signatures.record_started(request);
        if let Err(source) = self.environment_swap.transition(request).await {
            error!(route_id, error = %source, "navigation_swap_failed");
            self.signatures.clear_if(&signature);
            return Err(NavigationError::Collaborator {
                route_id: route_id.to_string(),
                source,
            });
        }
        Ok(signature)
    }
}
