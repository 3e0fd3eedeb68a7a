use kube::CustomResource;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A cluster-scoped pod security policy.
///
/// The `policy/v1beta1` API was removed from Kubernetes and from k8s-openapi, so the type is
/// declared here with an opaque spec. The controller never interprets the spec; it only copies it
/// from a `PodSecurityPolicyTemplate` and compares it structurally.
#[derive(Clone, Debug, Default, PartialEq, CustomResource, Deserialize, Serialize)]
#[kube(
    group = "policy",
    version = "v1beta1",
    kind = "PodSecurityPolicy",
    schema = "disabled"
)]
pub struct PodSecurityPolicySpec {
    #[serde(flatten)]
    pub fields: BTreeMap<String, serde_json::Value>,
}

impl<K: Into<String>> FromIterator<(K, serde_json::Value)> for PodSecurityPolicySpec {
    fn from_iter<T: IntoIterator<Item = (K, serde_json::Value)>>(iter: T) -> Self {
        Self {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}
