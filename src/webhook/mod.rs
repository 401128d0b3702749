//! Mutating Admission Webhook for Pods
//!
//! The API server calls `POST /mutate` with an AdmissionReview for every Pod
//! being admitted. The handler decodes the Pod, asks the [`PodMutator`] for a
//! JSON Patch and answers with an AdmissionReview carrying that patch.
//!
//! Every path through the handler produces a well-formed AdmissionReview; parse
//! failures become denials, never transport errors.

pub mod pod;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;

use crate::mutation::PodMutator;

pub use pod::{review, WebhookError};

/// Default request body limit: Kubernetes caps objects at roughly 3 MiB
pub const DEFAULT_MAX_BODY_BYTES: usize = 3 * 1024 * 1024;

/// Shared state for webhook handlers
#[derive(Clone, Debug, Default)]
pub struct WebhookState {
    /// Engine computing the patch for each admitted pod
    pub mutator: PodMutator,
}

impl WebhookState {
    /// Create a new webhook state around the given mutator
    pub fn new(mutator: PodMutator) -> Self {
        Self { mutator }
    }
}

/// Create the webhook router with the default body limit
///
/// Routes:
/// - POST /mutate - Mutate Pods
/// - GET /health - Liveness probe
pub fn webhook_router(state: Arc<WebhookState>) -> Router {
    webhook_router_with_limit(state, DEFAULT_MAX_BODY_BYTES)
}

/// Create the webhook router with an explicit request body limit
pub fn webhook_router_with_limit(state: Arc<WebhookState>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/mutate", post(pod::mutate_handler))
        .route("/health", get(|| async { "OK" }))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}
