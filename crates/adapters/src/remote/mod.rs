//! REST adapters for the console and tenant backends.
//!
//! One [`DualBackendClient`] implements every remote port. Failures are
//! classified into [`ErrorDescriptor`]s before they are surfaced as
//! envelopes.

mod classify;
mod client;
mod oauth2;
mod project;
mod routing;

pub use classify::{
    ErrorDescriptor, FEATURE_NOT_AVAILABLE, REQUEST_ID_HEADER, RemoteFailure, TransportKind,
    classify,
};
pub use client::DualBackendClient;
pub use routing::{DEFAULT_CONSOLE_ROUTE, DEFAULT_TENANT_ROUTE, Operation, RoutingTable};
