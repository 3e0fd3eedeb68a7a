use crate::policy::PodSecurityPolicySpec;
use kube::CustomResource;
use serde::{Deserialize, Serialize};

// The template's spec is an opaque pod security policy spec that is copied verbatim onto the
// materialized `PodSecurityPolicy`.
#[derive(Clone, Debug, Default, PartialEq, CustomResource, Deserialize, Serialize)]
#[kube(
    group = "management.cattle.io",
    version = "v3",
    kind = "PodSecurityPolicyTemplate",
    schema = "disabled"
)]
pub struct PodSecurityPolicyTemplateSpec {
    #[serde(flatten)]
    pub policy: PodSecurityPolicySpec,
}
