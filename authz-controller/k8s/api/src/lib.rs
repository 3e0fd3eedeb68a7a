#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod labels;
pub mod management;
pub mod policy;

pub use self::labels::Selector;
pub use k8s_openapi::api::{
    self,
    core::v1::Namespace,
    rbac::v1::{ClusterRole, ClusterRoleBinding, PolicyRule, Role, RoleBinding, RoleRef, Subject},
};
pub use kube::{
    api::{Api, ObjectMeta, ResourceExt},
    Client, Error, Resource,
};
