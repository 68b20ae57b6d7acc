//! `facets-routing`: picks a handler from the classification levels of the
//! entities a request names.

pub mod catalog;
pub mod dispatcher;
pub mod error;
pub mod params;
pub mod route_key;

pub use catalog::{EntityCatalog, EntityConfig};
pub use dispatcher::{Handler, RouteDispatcher, RouteRequest};
pub use error::RoutingError;
pub use params::{extract_route_params, EntityValue, RouteParams};
pub use route_key::RouteKey;
