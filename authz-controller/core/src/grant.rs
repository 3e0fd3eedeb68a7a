use crate::{naming, RuleSet, RBAC_API_GROUP};
use authz_controller_k8s_api::RoleRef;
use std::collections::BTreeSet;

/// A role template with its reference graph flattened.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResolvedTemplate {
    /// The root template's name.
    pub name: String,

    /// Whether the root template is itself builtin, in which case there is nothing to materialize.
    pub builtin: bool,

    /// The union of the rules of the root and of every non-builtin template it reaches.
    pub rules: RuleSet,

    /// Every non-builtin template whose rules were flattened into `rules`, including the root.
    pub templates: BTreeSet<String>,

    /// Every builtin template reachable from the root.
    pub builtins: BTreeSet<String>,
}

/// A role that a binding grants its subject.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Grant {
    pub role: String,

    /// Builtin roles are pre-provisioned ClusterRoles that are referenced but never written.
    pub builtin: bool,
}

// === impl ResolvedTemplate ===

impl ResolvedTemplate {
    pub fn builtin(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            builtins: Some(name.clone()).into_iter().collect(),
            name,
            builtin: true,
            ..Default::default()
        }
    }

    /// The roles to bind: the materialized root role, if any, and each builtin role.
    pub fn grants(&self) -> Vec<Grant> {
        let root = (!self.builtin).then(|| Grant {
            role: self.name.clone(),
            builtin: false,
        });
        root.into_iter()
            .chain(self.builtins.iter().map(|role| Grant {
                role: role.clone(),
                builtin: true,
            }))
            .collect()
    }

    /// Whether the named template contributed to this resolution.
    pub fn references(&self, template: &str) -> bool {
        self.templates.contains(template) || self.builtins.contains(template)
    }
}

// === impl Grant ===

impl Grant {
    /// References the granted role from a RoleBinding (`namespaced`) or a ClusterRoleBinding.
    ///
    /// Materialized roles are namespaced Roles for namespaced bindings; builtin roles are always
    /// ClusterRoles.
    pub fn role_ref(&self, namespaced: bool) -> RoleRef {
        let kind = if namespaced && !self.builtin {
            "Role"
        } else {
            "ClusterRole"
        };
        RoleRef {
            api_group: RBAC_API_GROUP.to_string(),
            kind: kind.to_string(),
            name: self.role.clone(),
        }
    }

    pub fn binding_name(&self, subject: &str, owner_uid: &str) -> String {
        naming::binding_name(&self.role, subject, owner_uid)
    }
}
