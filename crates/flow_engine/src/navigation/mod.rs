mod catalog;
mod resolver;
mod service;

pub use catalog::{NavigationCatalog, NavigationIntent, RouteEntry};
pub use resolver::{ResolvedRoute, RouteResolver, RouteSource, StartHistory};
pub use service::{GameplayRoutePayload, NavigationOutcome, NavigationService};
