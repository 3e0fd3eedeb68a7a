use crate::Subject;
use kube::{CustomResource, Resource};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Grants a subject a role template in every namespace of a project.
#[derive(Clone, Debug, Default, PartialEq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "management.cattle.io",
    version = "v3",
    kind = "ProjectRoleTemplateBinding",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRoleTemplateBindingSpec {
    pub subject: Subject,
    pub project_name: String,
    pub role_template_name: String,
}

/// Grants a subject a role template across the whole cluster.
#[derive(Clone, Debug, Default, PartialEq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "management.cattle.io",
    version = "v3",
    kind = "ClusterRoleTemplateBinding",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterRoleTemplateBindingSpec {
    pub subject: Subject,
    pub cluster_name: Option<String>,
    pub role_template_name: String,
}

/// The scope that a binding's grant is materialized into.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BindingScope<'a> {
    Project(&'a str),
    Cluster,
}

/// Common view over both binding kinds.
pub trait RoleTemplateBinding: Resource<DynamicType = ()> {
    fn subject(&self) -> &Subject;

    fn role_template_name(&self) -> &str;

    fn scope(&self) -> BindingScope<'_>;
}

impl RoleTemplateBinding for ProjectRoleTemplateBinding {
    fn subject(&self) -> &Subject {
        &self.spec.subject
    }

    fn role_template_name(&self) -> &str {
        &self.spec.role_template_name
    }

    fn scope(&self) -> BindingScope<'_> {
        BindingScope::Project(&self.spec.project_name)
    }
}

impl RoleTemplateBinding for ClusterRoleTemplateBinding {
    fn subject(&self) -> &Subject {
        &self.spec.subject
    }

    fn role_template_name(&self) -> &str {
        &self.spec.role_template_name
    }

    fn scope(&self) -> BindingScope<'_> {
        BindingScope::Cluster
    }
}
