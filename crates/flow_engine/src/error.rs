use thiserror::Error;

use crate::collaborators::CollaboratorError;
use crate::plan::FlowScope;

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("{scope:?} content change failed: {source}")]
    Collaborator {
        scope: FlowScope,
        #[source]
        source: CollaboratorError,
    },
}

#[derive(Debug, Error)]
pub enum NavigationError {
    #[error("no route registered for core navigation intent {intent}")]
    MissingCoreIntent { intent: &'static str },
    #[error("route '{route_id}' is not present in the navigation catalog")]
    UnknownRoute { route_id: String },
    #[error(
        "restart could not resolve a route: no session snapshot, no mappable level \
and no previously started route"
    )]
    RestartUnresolved,
    #[error("no level selected in the session")]
    NothingSelected,
    #[error("level '{level_id}' does not map to a route: {detail}")]
    UnmappedLevel { level_id: String, detail: String },
    #[error("content change for route '{route_id}' failed: {source}")]
    ContentChange {
        route_id: String,
        #[source]
        source: FlowError,
    },
    #[error("navigation to '{route_id}' failed: {source}")]
    Collaborator {
        route_id: String,
        #[source]
        source: CollaboratorError,
    },
}

impl NavigationError {
    /// Missing configuration is fatal; the caller is expected to surface it
    /// rather than retry.
    pub fn is_configuration_missing(&self) -> bool {
        matches!(
            self,
            NavigationError::MissingCoreIntent { .. }
                | NavigationError::UnknownRoute { .. }
                | NavigationError::RestartUnresolved
                | NavigationError::UnmappedLevel { .. }
        )
    }
}
