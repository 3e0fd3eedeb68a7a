pub mod binding;
pub mod cluster;
pub mod pod_security_policy_template;
pub mod role_template;

pub use self::{
    binding::{
        BindingScope, ClusterRoleTemplateBinding, ClusterRoleTemplateBindingSpec,
        ProjectRoleTemplateBinding, ProjectRoleTemplateBindingSpec, RoleTemplateBinding,
    },
    cluster::{Cluster, ClusterCondition, ClusterSpec, ClusterStatus},
    pod_security_policy_template::PodSecurityPolicyTemplate,
    role_template::{RoleTemplate, RoleTemplateSpec},
};

pub const API_GROUP: &str = "management.cattle.io";
