//! Pod mutation engine
//!
//! Decides, per container, whether the `RAVEN_URLS` variable has to be
//! injected and expresses the result as JSON Patch `add` operations. The
//! engine is a pure function of the Pod: no I/O, no shared state, and the same
//! Pod always yields the same operations in the same order.

use json_patch::{AddOperation, PatchOperation};
use jsonptr::PointerBuf;
use k8s_openapi::api::core::v1::{Container, EnvVar, Pod};
use tracing::debug;

/// Name of the variable whose presence marks a container as already mutated
pub const RAVEN_URLS_ENV: &str = "RAVEN_URLS";

/// Value injected for [`RAVEN_URLS_ENV`]
pub const RAVEN_URLS_VALUE: &str = "foo";

/// Companion variable added alongside `RAVEN_URLS` when the env list is created
pub const COMPANION_ENV: &str = "FOO";

/// Value injected for [`COMPANION_ENV`]
pub const COMPANION_VALUE: &str = "Bar";

/// Which container list of the pod spec a container lives in
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContainerList {
    /// `spec.containers`
    Containers,
    /// `spec.initContainers`
    InitContainers,
}

impl ContainerList {
    /// JSON field name of the list inside the pod spec
    pub fn field(self) -> &'static str {
        match self {
            ContainerList::Containers => "containers",
            ContainerList::InitContainers => "initContainers",
        }
    }
}

/// Computes the env-var injection patch for a Pod
#[derive(Clone, Debug)]
pub struct PodMutator {
    sentinel: EnvVar,
    companion: EnvVar,
}

impl Default for PodMutator {
    fn default() -> Self {
        Self::new()
    }
}

impl PodMutator {
    /// Create a mutator injecting `RAVEN_URLS=foo` (and `FOO=Bar` on env creation)
    pub fn new() -> Self {
        Self {
            sentinel: env_var(RAVEN_URLS_ENV, RAVEN_URLS_VALUE),
            companion: env_var(COMPANION_ENV, COMPANION_VALUE),
        }
    }

    /// Compute the patch operations for a pod
    ///
    /// Regular containers come first, then init containers; each group keeps
    /// the order of its source list. Containers already carrying `RAVEN_URLS`
    /// contribute nothing, so a mutated pod yields an empty list.
    pub fn compute_patches(&self, pod: &Pod) -> Vec<PatchOperation> {
        let Some(spec) = pod.spec.as_ref() else {
            return Vec::new();
        };

        let init_containers = spec.init_containers.as_deref().unwrap_or_default();

        let regular = spec
            .containers
            .iter()
            .enumerate()
            .filter_map(|(i, c)| self.container_patch(ContainerList::Containers, i, c));
        let init = init_containers
            .iter()
            .enumerate()
            .filter_map(|(i, c)| self.container_patch(ContainerList::InitContainers, i, c));

        regular.chain(init).collect()
    }

    /// Patch for a single container, or `None` if it already has `RAVEN_URLS`
    fn container_patch(
        &self,
        list: ContainerList,
        index: usize,
        container: &Container,
    ) -> Option<PatchOperation> {
        // An absent env list and an empty one are the same state.
        let env = container.env.as_deref().unwrap_or_default();
        let index = index.to_string();

        if env.iter().any(|e| e.name == RAVEN_URLS_ENV) {
            debug!(
                container = %container.name,
                list = list.field(),
                "container already has RAVEN_URLS, skipping"
            );
            return None;
        }

        if env.is_empty() {
            debug!(
                container = %container.name,
                list = list.field(),
                "creating env list"
            );
            // `add` on a missing array key must carry the whole array.
            return Some(PatchOperation::Add(AddOperation {
                path: PointerBuf::from_tokens(["spec", list.field(), index.as_str(), "env"]),
                value: serde_json::json!([self.sentinel, self.companion]),
            }));
        }

        debug!(
            container = %container.name,
            list = list.field(),
            existing = env.len(),
            "appending to env list"
        );
        Some(PatchOperation::Add(AddOperation {
            path: PointerBuf::from_tokens(["spec", list.field(), index.as_str(), "env", "-"]),
            value: serde_json::json!(self.sentinel),
        }))
    }
}

fn env_var(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        value_from: None,
    }
}
