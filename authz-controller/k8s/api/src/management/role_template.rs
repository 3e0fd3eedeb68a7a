use crate::PolicyRule;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A named, composable bundle of access rules.
///
/// A template may include other templates by name. A `builtin` template stands for a native
/// ClusterRole of the same name that is provisioned outside of this controller; its rules are
/// never materialized.
#[derive(Clone, Debug, Default, PartialEq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(group = "management.cattle.io", version = "v3", kind = "RoleTemplate")]
#[serde(rename_all = "camelCase")]
pub struct RoleTemplateSpec {
    pub display_name: Option<String>,

    #[serde(default)]
    pub builtin: bool,

    #[serde(default)]
    pub rules: Vec<PolicyRule>,

    #[serde(default)]
    pub role_template_names: Vec<String>,
}
