//! AdmissionReview wire model (`admission.k8s.io/v1`)
//!
//! The API server sends an `AdmissionReview` carrying a `request` and expects
//! one back carrying a `response`. The admitted resource travels as an opaque
//! JSON blob and is only decoded when a handler asks for a concrete type, so
//! the envelope never needs to know which resource it wraps.

use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

/// API version of every AdmissionReview this webhook emits
pub const ADMISSION_API_VERSION: &str = "admission.k8s.io/v1";

/// Kind of every AdmissionReview this webhook emits
pub const ADMISSION_KIND: &str = "AdmissionReview";

/// `status.status` value on a failed review
pub const STATUS_FAILURE: &str = "Failure";

/// Versioned envelope wrapping either a request or a response
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionReview {
    /// Always `admission.k8s.io/v1` on outbound reviews
    #[serde(default)]
    pub api_version: String,
    /// Always `AdmissionReview` on outbound reviews
    #[serde(default)]
    pub kind: String,
    /// Populated on reviews sent by the API server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<AdmissionRequest>,
    /// Populated on reviews sent back by the webhook
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<AdmissionResponse>,
}

impl AdmissionReview {
    /// Wrap a response in a fresh outbound envelope
    pub fn from_response(response: AdmissionResponse) -> Self {
        Self {
            api_version: ADMISSION_API_VERSION.to_string(),
            kind: ADMISSION_KIND.to_string(),
            request: None,
            response: Some(response),
        }
    }
}

/// Group/version/kind triple as it appears in admission requests
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupVersionKind {
    /// API group, empty for the core group
    #[serde(default)]
    pub group: String,
    /// API version
    pub version: String,
    /// Resource kind
    pub kind: String,
}

/// Group/version/resource triple as it appears in admission requests
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupVersionResource {
    /// API group, empty for the core group
    #[serde(default)]
    pub group: String,
    /// API version
    pub version: String,
    /// Plural resource name
    pub resource: String,
}

/// Operation that triggered the admission call
///
/// Values outside the four known operations are carried through as `Other`
/// so an unfamiliar operation never fails the whole envelope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    /// Object creation
    Create,
    /// Object update
    Update,
    /// Object deletion
    Delete,
    /// Connect to a subresource (exec, attach, ...)
    Connect,
    /// Any operation string not listed above, kept verbatim
    #[serde(untagged)]
    Other(String),
}

/// The admission event the API server asks us to decide on
///
/// Only `uid` and `object` matter to the mutation; everything else is kept so
/// the envelope round-trips intact.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionRequest {
    /// Correlation token, echoed back unchanged in the response
    pub uid: String,
    /// Kind of the object being admitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<GroupVersionKind>,
    /// Resource being requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<GroupVersionResource>,
    /// Subresource, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_resource: Option<String>,
    /// Kind originally requested, before conversion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_kind: Option<GroupVersionKind>,
    /// Resource originally requested, before conversion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_resource: Option<GroupVersionResource>,
    /// Subresource originally requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_sub_resource: Option<String>,
    /// Object name; may be empty on CREATE when generateName is used
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Object namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Operation being admitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<Operation>,
    /// Identity of the requesting user, undecoded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_info: Option<Box<RawValue>>,
    /// The resource being admitted, undecoded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<Box<RawValue>>,
    /// Previous state of the resource on UPDATE/DELETE, undecoded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_object: Option<Box<RawValue>>,
    /// Whether the request is a dry run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<bool>,
    /// Operation options (CreateOptions, UpdateOptions, ...), undecoded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Box<RawValue>>,
}

/// Failure to decode the embedded object of an admission request
#[derive(Debug, thiserror::Error)]
pub enum ObjectError {
    /// The request carries no object, or a JSON `null`
    #[error("request carries no object")]
    Missing,

    /// The object does not match the requested schema
    #[error("{0}")]
    Decode(#[from] serde_json::Error),
}

impl AdmissionRequest {
    /// Decode the embedded object into `K`
    pub fn decode_object<K: DeserializeOwned>(&self) -> Result<K, ObjectError> {
        let raw = self.object.as_ref().ok_or(ObjectError::Missing)?;
        Ok(serde_json::from_str(raw.get())?)
    }
}

/// Patch encoding announced in `patchType`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatchType {
    /// RFC 6902 JSON Patch
    #[serde(rename = "JSONPatch")]
    JsonPatch,
}

/// Failure details attached to a denied response
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// `Success` or `Failure`
    pub status: String,
    /// Human-readable description
    pub message: String,
    /// Machine-readable reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// HTTP-style status code
    pub code: u16,
}

/// The webhook's decision for one admission request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionResponse {
    /// Copy of the request uid
    pub uid: String,
    /// Whether the object may be admitted
    pub allowed: bool,
    /// Set only when processing failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    /// Base64-encoded JSON Patch document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,
    /// Set whenever `patch` is set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch_type: Option<PatchType>,
    /// Annotations recorded in the audit event
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_annotations: Option<BTreeMap<String, String>>,
    /// Warnings returned to the requesting client
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warnings: Option<Vec<String>>,
}

impl AdmissionResponse {
    /// Allow the request unchanged
    pub fn allow(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            allowed: true,
            status: None,
            patch: None,
            patch_type: None,
            audit_annotations: None,
            warnings: None,
        }
    }

    /// Reject the request with a failure status
    pub fn failure(uid: impl Into<String>, message: impl Into<String>, code: u16) -> Self {
        Self {
            uid: uid.into(),
            allowed: false,
            status: Some(Status {
                status: STATUS_FAILURE.to_string(),
                message: message.into(),
                reason: Some("InternalError".to_string()),
                code,
            }),
            patch: None,
            patch_type: None,
            audit_annotations: None,
            warnings: None,
        }
    }

    /// Attach a JSON Patch; an empty patch leaves the response untouched
    pub fn with_patch(mut self, patch: &json_patch::Patch) -> Result<Self, serde_json::Error> {
        if patch.0.is_empty() {
            return Ok(self);
        }
        let bytes = serde_json::to_vec(patch)?;
        self.patch = Some(STANDARD.encode(bytes));
        self.patch_type = Some(PatchType::JsonPatch);
        Ok(self)
    }

    /// Wrap in an outbound AdmissionReview
    pub fn into_review(self) -> AdmissionReview {
        AdmissionReview::from_response(self)
    }
}

#[cfg(test)]
impl AdmissionReview {
    /// Wrap a request in an envelope, as the API server would send it
    pub(crate) fn from_request(request: AdmissionRequest) -> Self {
        Self {
            api_version: ADMISSION_API_VERSION.to_string(),
            kind: ADMISSION_KIND.to_string(),
            request: Some(request),
            response: None,
        }
    }
}

#[cfg(test)]
impl AdmissionRequest {
    /// Minimal request around an already-serialized object
    pub(crate) fn new(uid: impl Into<String>, object: Box<RawValue>) -> Self {
        Self {
            uid: uid.into(),
            kind: None,
            resource: None,
            sub_resource: None,
            request_kind: None,
            request_resource: None,
            request_sub_resource: None,
            name: None,
            namespace: None,
            operation: None,
            user_info: None,
            object: Some(object),
            old_object: None,
            dry_run: None,
            options: None,
        }
    }
}

#[cfg(test)]
impl AdmissionResponse {
    /// Raw JSON of the attached patch, if any
    pub(crate) fn decoded_patch(&self) -> Option<Vec<u8>> {
        self.patch
            .as_ref()
            .map(|p| STANDARD.decode(p).expect("patch is valid base64"))
    }
}
