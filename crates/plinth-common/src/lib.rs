//! Common types for Plinth: workload specs, errors, naming and secret material

#![deny(missing_docs)]

pub mod error;
pub mod naming;
pub mod secret;
pub mod spec;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Tag key carrying the physical resource name
pub const TAG_NAME: &str = "Name";

/// Tag key marking a resource as engine-managed
pub const TAG_MANAGED: &str = "Managed";

/// Value of the `Managed` tag on every resource Plinth creates
pub const TAG_MANAGED_VALUE: &str = "plinth";

/// Tag key carrying the workload identity
pub const TAG_PROJECT: &str = "Project";

/// Tag key carrying the deployment environment
pub const TAG_ENVIRONMENT: &str = "Environment";

/// Environment value that enables production safeguards (deletion
/// protection, final snapshots)
pub const PRODUCTION_ENVIRONMENT: &str = "prod";
