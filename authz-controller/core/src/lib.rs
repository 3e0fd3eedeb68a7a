//! Authorization grant propagation.
//!
//! Role templates and bindings are declarative; this crate holds the pure logic that turns them
//! into native RBAC objects:
//!
//! - A `RoleTemplate` names rules and other templates. Resolving a template flattens this graph
//!   into one rule set plus the set of builtin role names it reaches.
//! - A binding (`ProjectRoleTemplateBinding` or `ClusterRoleTemplateBinding`) grants a subject a
//!   template. Its grant fans out to every namespace of a project, or to the cluster scope.
//! - Every materialized binding object is named deterministically from the role, the subject and
//!   the owning binding's UID, and is labeled with that UID so that it can be cleaned up when the
//!   binding is deleted.
//!
//! ```text
//! [ RoleTemplate ] <- [ Binding ] -> [ Namespace* ] -> [ Role, RoleBinding ]
//! ```

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod binding;
pub mod grant;
pub mod naming;
pub mod rules;
pub mod scope;

pub use self::{
    binding::BindingState,
    grant::{Grant, ResolvedTemplate},
    rules::RuleSet,
    scope::FanOut,
};

/// Labels a namespace with the name of the project that owns it.
pub const PROJECT_LABEL: &str = "field.cattle.io/projectId";

/// Labels a materialized object with the UID of the binding that owns it.
pub const OWNER_LABEL: &str = "authz.management.cattle.io/rtb-owner";

/// Labels a materialized Role or ClusterRole with the template it was rendered from.
pub const TEMPLATE_LABEL: &str = "authz.management.cattle.io/role-template";

/// Defers a binding's removal until its materialized objects are deleted.
pub const FINALIZER: &str = "controller.cattle.io/authz-binding";

/// Set on the `Cluster` once the bootstrap namespace has been assigned to the default project.
pub const DEFAULT_NAMESPACE_ASSIGNED: &str = "DefaultNamespaceAssigned";

pub const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";

/// Resource kind that marks a rule as granting use of pod security policies.
pub const PSP_RESOURCE: &str = "podsecuritypolicies";
