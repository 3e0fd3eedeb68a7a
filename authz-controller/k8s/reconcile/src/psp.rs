use crate::{error::Errors, store::Store, Result};
use authz_controller_core::{RuleSet, OWNER_LABEL};
use authz_controller_k8s_api::{
    management::PodSecurityPolicyTemplate, policy::PodSecurityPolicy, ResourceExt,
};

/// Materializes a `PodSecurityPolicy` for every policy that the rules grant `use` of.
///
/// Each policy's spec is copied from the `PodSecurityPolicyTemplate` of the same name. A template
/// that cannot be fetched is skipped with a warning. New policies are labeled with `owner_uid`.
pub async fn ensure_psps<S: Store>(store: &S, rules: &RuleSet, owner_uid: &str) -> Result<()> {
    let mut errors = Errors::default();
    for name in rules.psp_names() {
        let template = match store.get::<PodSecurityPolicyTemplate>(None, &name).await {
            Ok(Some(template)) => template,
            Ok(None) => {
                tracing::warn!(%name, "PodSecurityPolicyTemplate not found; skipping");
                continue;
            }
            Err(error) => {
                tracing::warn!(%name, %error, "Failed to fetch PodSecurityPolicyTemplate; skipping");
                continue;
            }
        };
        errors.record(ensure_psp(store, &name, template, owner_uid).await);
    }
    errors.into_result()
}

async fn ensure_psp<S: Store>(
    store: &S,
    name: &str,
    template: PodSecurityPolicyTemplate,
    owner_uid: &str,
) -> Result<()> {
    let spec = template.spec.policy;
    match store.get::<PodSecurityPolicy>(None, name).await? {
        None => {
            let mut psp = PodSecurityPolicy::new(name, spec);
            psp.labels_mut()
                .insert(OWNER_LABEL.to_string(), owner_uid.to_string());
            tracing::info!(%name, "Creating PodSecurityPolicy");
            match store.create(psp).await {
                Err(error) if error.is_already_exists() => Ok(()),
                result => result.map(|_| ()),
            }
        }

        Some(existing) if existing.spec == spec => Ok(()),

        Some(mut existing) => {
            existing.spec = spec;
            tracing::info!(%name, "Updating PodSecurityPolicy");
            store.update(existing).await.map(|_| ())
        }
    }
}
