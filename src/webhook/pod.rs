//! Pod Mutation Webhook
//!
//! Handles AdmissionReview requests for Pod resources, injecting the
//! `RAVEN_URLS` environment variable into every container that lacks it.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use k8s_openapi::api::core::v1::Pod;
use tracing::{error, info};

use crate::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, ObjectError};
use crate::mutation::PodMutator;

use super::WebhookState;

/// uid reported when the request uid could not be recovered
pub const UNKNOWN_UID: &str = "unknown";

/// Error type for webhook operations
///
/// None of these escape as transport errors; each becomes a denial envelope.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// The body could not be read or is not a valid AdmissionReview
    #[error("malformed admission review: {0}")]
    MalformedEnvelope(String),

    /// The AdmissionReview parsed but carries no request
    #[error("admission review has no request")]
    MissingRequest,

    /// The embedded object does not decode as a Pod
    #[error("object is not a valid Pod: {0}")]
    MalformedObject(#[from] ObjectError),

    /// The computed patch could not be serialized
    #[error("failed to serialize patch: {0}")]
    SerializationFailure(#[source] serde_json::Error),
}

impl WebhookError {
    /// Denial response for this error, addressed to `uid`
    pub fn into_admission_response(self, uid: &str) -> AdmissionResponse {
        AdmissionResponse::failure(
            uid,
            format!("Failed to process admission review: {self}"),
            StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
        )
    }
}

/// Handle mutating admission review for Pods
///
/// The body is taken as raw bytes so that malformed payloads still get an
/// AdmissionReview back instead of an extractor rejection.
pub async fn mutate_handler(
    State(state): State<Arc<WebhookState>>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let (status, review) = match body {
        Ok(bytes) => review(&state.mutator, &bytes),
        Err(e) => deny(UNKNOWN_UID, WebhookError::MalformedEnvelope(e.body_text())),
    };
    (status, Json(review)).into_response()
}

/// Turn a raw AdmissionReview body into the status code and review to return
///
/// Success is HTTP 200 with `allowed: true`; any failure is HTTP 500 with
/// `allowed: false` and a populated status. The response uid is the request
/// uid whenever the request could be parsed, `"unknown"` otherwise.
pub fn review(mutator: &PodMutator, body: &[u8]) -> (StatusCode, AdmissionReview) {
    let request = match parse_request(body) {
        Ok(request) => request,
        Err(e) => return deny(UNKNOWN_UID, e),
    };

    match mutate_pod(mutator, &request) {
        Ok(response) => (StatusCode::OK, response.into_review()),
        Err(e) => deny(&request.uid, e),
    }
}

/// Deserialize the envelope and extract its request
fn parse_request(body: &[u8]) -> Result<AdmissionRequest, WebhookError> {
    let review: AdmissionReview = serde_json::from_slice(body)
        .map_err(|e| WebhookError::MalformedEnvelope(e.to_string()))?;
    review.request.ok_or(WebhookError::MissingRequest)
}

/// Process a single pod mutation request
fn mutate_pod(
    mutator: &PodMutator,
    request: &AdmissionRequest,
) -> Result<AdmissionResponse, WebhookError> {
    let uid = request.uid.as_str();
    let pod: Pod = request.decode_object()?;

    let namespace = request
        .namespace
        .as_deref()
        .or(pod.metadata.namespace.as_deref())
        .unwrap_or_default();
    let name = request
        .name
        .as_deref()
        .or(pod.metadata.name.as_deref())
        .or(pod.metadata.generate_name.as_deref())
        .unwrap_or_default();

    info!(
        uid = %uid,
        namespace = %namespace,
        name = %name,
        operation = ?request.operation,
        dry_run = request.dry_run.unwrap_or(false),
        "Processing pod"
    );

    let patch = json_patch::Patch(mutator.compute_patches(&pod));
    let patch_ops = patch.0.len();

    let response = AdmissionResponse::allow(uid)
        .with_patch(&patch)
        .map_err(WebhookError::SerializationFailure)?;

    if patch_ops == 0 {
        info!(uid = %uid, namespace = %namespace, name = %name, "No patches needed for pod");
    } else {
        info!(
            uid = %uid,
            namespace = %namespace,
            name = %name,
            patch_ops,
            "Generated patches for pod"
        );
    }

    Ok(response)
}

fn deny(uid: &str, err: WebhookError) -> (StatusCode, AdmissionReview) {
    error!(uid = %uid, error = %err, "Failed to process admission review");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        err.into_admission_response(uid).into_review(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::{PatchType, ADMISSION_API_VERSION, ADMISSION_KIND};
    use serde_json::{json, Value};

    // =========================================================================
    // Fixtures
    // =========================================================================

    fn review_body(uid: &str, pod: Value) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": {
                "uid": uid,
                "kind": {"group": "", "version": "v1", "kind": "Pod"},
                "resource": {"group": "", "version": "v1", "resource": "pods"},
                "namespace": "default",
                "operation": "CREATE",
                "object": pod
            }
        }))
        .unwrap()
    }

    fn pod_json(containers: Value) -> Value {
        json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": "test-pod", "namespace": "default"},
            "spec": {"containers": containers}
        })
    }

    fn decoded_patch(review: &AdmissionReview) -> Value {
        let response = review.response.as_ref().expect("response present");
        serde_json::from_slice(&response.decoded_patch().expect("patch present")).unwrap()
    }

    // =========================================================================
    // Unit Tests
    // =========================================================================

    #[test]
    fn test_webhook_error_display() {
        let err = WebhookError::MissingRequest;
        assert!(err.to_string().contains("no request"));

        let err = WebhookError::MalformedObject(ObjectError::Missing);
        assert!(err.to_string().contains("not a valid Pod"));

        let err = WebhookError::SerializationFailure(
            serde_json::from_str::<()>("invalid").unwrap_err(),
        );
        assert!(err.to_string().contains("serialize"));
    }

    #[test]
    fn test_error_response_shape() {
        let response = WebhookError::MissingRequest.into_admission_response("abc");
        assert_eq!(response.uid, "abc");
        assert!(!response.allowed);

        let status = response.status.expect("status present");
        assert_eq!(status.status, "Failure");
        assert_eq!(status.code, 500);
        assert!(status.message.starts_with("Failed to process admission review: "));
    }

    #[test]
    fn test_envelope_constants_on_success() {
        let body = review_body("uid-1", pod_json(json!([{"name": "nginx"}])));
        let (status, review) = review(&PodMutator::new(), &body);

        assert_eq!(status, StatusCode::OK);
        assert_eq!(review.api_version, ADMISSION_API_VERSION);
        assert_eq!(review.kind, ADMISSION_KIND);
        assert!(review.request.is_none());
    }

    #[test]
    fn test_pod_without_spec_is_allowed_unchanged() {
        let body = review_body("uid-2", json!({"apiVersion": "v1", "kind": "Pod"}));
        let (status, review) = review(&PodMutator::new(), &body);

        assert_eq!(status, StatusCode::OK);
        let response = review.response.unwrap();
        assert!(response.allowed);
        assert!(response.patch.is_none());
    }

    #[test]
    fn test_typed_request_round_trip() {
        use serde_json::value::RawValue;

        let object =
            RawValue::from_string(pod_json(json!([{"name": "nginx"}])).to_string()).unwrap();
        let request = AdmissionRequest::new("typed", object);
        let body = serde_json::to_vec(&AdmissionReview::from_request(request)).unwrap();

        let (status, review) = review(&PodMutator::new(), &body);
        assert_eq!(status, StatusCode::OK);
        assert_eq!(review.response.unwrap().uid, "typed");
    }

    // =========================================================================
    // Story Tests
    // =========================================================================

    /// Story: an operation this build does not know about is still admitted
    #[test]
    fn story_unrecognised_operation_keeps_request_uid() {
        let body = serde_json::to_vec(&json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": {
                "uid": "uid-patch-op",
                "operation": "PATCH",
                "object": {"spec": {"containers": []}}
            }
        }))
        .unwrap();
        let (status, review) = review(&PodMutator::new(), &body);

        assert_eq!(status, StatusCode::OK);
        let response = review.response.unwrap();
        assert_eq!(response.uid, "uid-patch-op");
        assert!(response.allowed);
        assert!(response.patch.is_none());
    }

    /// Story: a bare nginx pod gets its env list created
    #[test]
    fn story_container_without_env_gets_env_list() {
        let body = review_body(
            "test-uid-123",
            pod_json(json!([{"name": "nginx", "image": "nginx:latest"}])),
        );
        let (status, review) = review(&PodMutator::new(), &body);

        assert_eq!(status, StatusCode::OK);
        let response = review.response.as_ref().unwrap();
        assert_eq!(response.uid, "test-uid-123");
        assert!(response.allowed);
        assert_eq!(response.patch_type, Some(PatchType::JsonPatch));

        assert_eq!(
            decoded_patch(&review),
            json!([{
                "op": "add",
                "path": "/spec/containers/0/env",
                "value": [
                    {"name": "RAVEN_URLS", "value": "foo"},
                    {"name": "FOO", "value": "Bar"}
                ]
            }])
        );
    }

    /// Story: a container with existing env gets RAVEN_URLS appended
    #[test]
    fn story_container_with_env_gets_append() {
        let body = review_body(
            "test-uid-123",
            pod_json(json!([{
                "name": "nginx",
                "env": [{"name": "EXISTING_VAR", "value": "x"}]
            }])),
        );
        let (_, review) = review(&PodMutator::new(), &body);

        assert_eq!(
            decoded_patch(&review),
            json!([{
                "op": "add",
                "path": "/spec/containers/0/env/-",
                "value": {"name": "RAVEN_URLS", "value": "foo"}
            }])
        );
    }

    /// Story: an already-mutated pod is allowed without a patch
    #[test]
    fn story_already_mutated_pod_has_no_patch() {
        let body = review_body(
            "test-uid-123",
            pod_json(json!([{
                "name": "nginx",
                "env": [{"name": "RAVEN_URLS", "value": "existing"}]
            }])),
        );
        let (status, review) = review(&PodMutator::new(), &body);

        assert_eq!(status, StatusCode::OK);
        let value = serde_json::to_value(&review).unwrap();
        assert_eq!(value["response"]["allowed"], true);
        assert!(value["response"].get("patch").is_none());
        assert!(value["response"].get("patchType").is_none());
    }

    /// Story: init containers are patched after regular containers
    ///
    /// Even when `initContainers` comes first in the submitted JSON, the
    /// regular container's patch leads.
    #[test]
    fn story_init_container_patch_follows_regular() {
        let body = review_body(
            "test-uid-123",
            json!({
                "apiVersion": "v1",
                "kind": "Pod",
                "metadata": {"name": "test-pod"},
                "spec": {
                    "initContainers": [{"name": "init", "image": "init:latest"}],
                    "containers": [{"name": "nginx", "image": "nginx:latest"}]
                }
            }),
        );
        let (_, review) = review(&PodMutator::new(), &body);
        let patch = decoded_patch(&review);

        assert_eq!(patch.as_array().unwrap().len(), 2);
        assert_eq!(patch[0]["path"], "/spec/containers/0/env");
        assert_eq!(patch[1]["path"], "/spec/initContainers/0/env");
    }

    /// Story: garbage bodies still get an AdmissionReview back
    #[test]
    fn story_non_json_body_is_denied_with_unknown_uid() {
        let (status, review) = review(&PodMutator::new(), b"this is not json");

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(review.api_version, ADMISSION_API_VERSION);
        let response = review.response.unwrap();
        assert_eq!(response.uid, UNKNOWN_UID);
        assert!(!response.allowed);
        let status = response.status.unwrap();
        assert_eq!(status.status, "Failure");
        assert_eq!(status.code, 500);
        assert!(status.message.contains("malformed admission review"));
    }

    /// Story: webhook wired to the wrong payload (request: null)
    #[test]
    fn story_null_request_is_denied() {
        let body = br#"{"apiVersion":"admission.k8s.io/v1","kind":"AdmissionReview","request":null}"#;
        let (status, review) = review(&PodMutator::new(), body);

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let response = review.response.unwrap();
        assert_eq!(response.uid, UNKNOWN_UID);
        assert!(response.status.unwrap().message.contains("no request"));
    }

    /// Story: the object is not a Pod, but the uid is still echoed
    #[test]
    fn story_malformed_object_keeps_request_uid() {
        let body = review_body("uid-bad-object", json!({"spec": {"containers": "nope"}}));
        let (status, review) = review(&PodMutator::new(), &body);

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let response = review.response.unwrap();
        assert_eq!(response.uid, "uid-bad-object");
        assert!(!response.allowed);
        assert!(response.status.unwrap().message.contains("not a valid Pod"));
    }

    /// Story: a request without an object is denied with its uid
    #[test]
    fn story_missing_object_keeps_request_uid() {
        let body = serde_json::to_vec(&json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": {"uid": "uid-no-object", "operation": "CREATE"}
        }))
        .unwrap();
        let (status, review) = review(&PodMutator::new(), &body);

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let response = review.response.unwrap();
        assert_eq!(response.uid, "uid-no-object");
        assert!(response.status.unwrap().message.contains("no object"));
    }
}
