use crate::{
    error::Errors,
    store::{Object, Store},
    Result,
};
use authz_controller_core::{FanOut, ResolvedTemplate, TEMPLATE_LABEL};
use authz_controller_k8s_api::{ClusterRole, PolicyRule, ResourceExt, Role};

/// Ensures the role rendered from a resolved template exists with exactly the resolved rules: one
/// `Role` per namespace in the fan-out, or a `ClusterRole` for the cluster scope.
///
/// Builtin roles are only checked for existence. A write failure in one scope does not prevent the
/// others from being attempted; the first failure is returned.
pub async fn ensure_roles<S: Store>(
    store: &S,
    resolved: &ResolvedTemplate,
    fan_out: &FanOut,
) -> Result<()> {
    for builtin in &resolved.builtins {
        match store.get::<ClusterRole>(None, builtin).await {
            Ok(Some(_)) => {}
            Ok(None) => tracing::warn!(role = %builtin, "Builtin ClusterRole does not exist"),
            Err(error) => tracing::warn!(role = %builtin, %error, "Failed to look up builtin ClusterRole"),
        }
    }

    if resolved.builtin {
        return Ok(());
    }

    let rules = resolved.rules.as_slice();
    let mut errors = Errors::default();
    for scope in fan_out.scopes() {
        let result = match scope {
            None => ensure_role(store, None, &resolved.name, rules, cluster_role_rules).await,
            Some(ns) => ensure_role(store, Some(ns), &resolved.name, rules, role_rules).await,
        };
        errors.record(result);
    }
    errors.into_result()
}

fn role_rules(role: &mut Role) -> &mut Option<Vec<PolicyRule>> {
    &mut role.rules
}

fn cluster_role_rules(role: &mut ClusterRole) -> &mut Option<Vec<PolicyRule>> {
    &mut role.rules
}

async fn ensure_role<S, K>(
    store: &S,
    namespace: Option<&str>,
    name: &str,
    rules: &[PolicyRule],
    rules_mut: fn(&mut K) -> &mut Option<Vec<PolicyRule>>,
) -> Result<()>
where
    S: Store,
    K: Object + Default + PartialEq,
{
    match store.get::<K>(namespace, name).await? {
        None => {
            let mut role = K::default();
            let meta = role.meta_mut();
            meta.name = Some(name.to_string());
            meta.namespace = namespace.map(Into::into);
            role.labels_mut()
                .insert(TEMPLATE_LABEL.to_string(), name.to_string());
            *rules_mut(&mut role) = Some(rules.to_vec());

            tracing::info!(kind = %K::kind(&()), ?namespace, %name, "Creating role");
            match store.create(role).await {
                Err(error) if error.is_already_exists() => {
                    // Created concurrently; the next pass compares its rules.
                    tracing::debug!(kind = %K::kind(&()), ?namespace, %name, "Role already exists");
                    Ok(())
                }
                result => result.map(|_| ()),
            }
        }

        Some(existing) => {
            let mut role = existing.clone();
            role.labels_mut()
                .insert(TEMPLATE_LABEL.to_string(), name.to_string());
            *rules_mut(&mut role) = Some(rules.to_vec());
            if role == existing {
                return Ok(());
            }

            tracing::info!(kind = %K::kind(&()), ?namespace, %name, "Updating role");
            store.update(role).await.map(|_| ())
        }
    }
}
