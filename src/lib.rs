//! Raven webhook - Kubernetes mutating admission webhook for Pods
//!
//! Every Pod admitted through this webhook gets a `RAVEN_URLS` environment
//! variable in each of its containers and init containers. The change is
//! expressed as a JSON Patch inside an `admission.k8s.io/v1` AdmissionReview.
//!
//! # Modules
//!
//! - [`admission`] - AdmissionReview/Request/Response wire model
//! - [`mutation`] - Pure patch computation for a Pod
//! - [`webhook`] - axum handlers for `/mutate` and `/health`
//! - [`server`] - HTTP/HTTPS listener setup
//! - [`telemetry`] - tracing subscriber setup
//! - [`error`] - Error types for server startup

#![deny(missing_docs)]

pub mod admission;
pub mod error;
pub mod mutation;
pub mod server;
pub mod telemetry;
pub mod webhook;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Default port for the webhook HTTPS server
///
/// Port 8443 is used instead of 443 to avoid requiring root privileges.
pub const DEFAULT_WEBHOOK_PORT: u16 = 8443;
