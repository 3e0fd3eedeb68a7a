use crate::{
    binding::Binding,
    error::Errors,
    store::{self, Object, Store},
    Result,
};
use authz_controller_core::{binding as state, OWNER_LABEL};
use authz_controller_k8s_api::{
    management::BindingScope, policy::PodSecurityPolicy, ClusterRoleBinding, ResourceExt,
    RoleBinding, Selector,
};

/// Attaches our finalizer to an object. An object that already carries it is not written.
pub async fn attach<S: Store, K: Object>(
    store: &S,
    namespace: Option<&str>,
    name: &str,
) -> Result<()> {
    store::update_with::<S, K, _>(store, namespace, name, |object| {
        let added = state::add_finalizer(&mut object.meta_mut().finalizers);
        if added {
            tracing::debug!("Attaching finalizer");
        }
        added
    })
    .await
    .map(|_| ())
}

/// Releases our finalizer, preserving any others. An object that is already gone is released.
pub async fn release<S: Store, K: Object>(
    store: &S,
    namespace: Option<&str>,
    name: &str,
) -> Result<()> {
    let released = store::update_with::<S, K, _>(store, namespace, name, |object| {
        state::remove_finalizer(&mut object.meta_mut().finalizers)
    })
    .await;
    match released {
        Err(error) if error.is_not_found() => Ok(()),
        result => result.map(|_| ()),
    }
}

/// Deletes every object that a terminating binding owns and then releases it.
///
/// Owned objects are found by the owner label across all namespaces, so objects in namespaces
/// that have since left the binding's project are also removed. The finalizer is kept if any
/// deletion fails.
#[tracing::instrument(
    skip_all,
    fields(kind = %B::kind(&()), namespace = ?binding.namespace(), name = %binding.name_unchecked()),
)]
pub async fn cleanup<S: Store, B: Binding>(store: &S, binding: &B) -> Result<()> {
    let mut errors = Errors::default();
    if let Some(uid) = binding.uid() {
        let selector = Selector::matching(OWNER_LABEL, uid);
        match binding.scope() {
            BindingScope::Project(_) => {
                errors.record(store::delete_matching::<S, RoleBinding>(store, &selector).await)
            }
            BindingScope::Cluster => errors.record(
                store::delete_matching::<S, ClusterRoleBinding>(store, &selector).await,
            ),
        };
        errors.record(store::delete_matching::<S, PodSecurityPolicy>(store, &selector).await);
    }
    if !errors.is_empty() {
        return errors.into_result();
    }

    tracing::info!("Releasing binding");
    release::<S, B>(store, binding.namespace().as_deref(), &binding.name_unchecked()).await
}
