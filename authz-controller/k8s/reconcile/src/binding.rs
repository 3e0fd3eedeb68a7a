use crate::{
    error::Errors,
    finalizer, psp,
    resolve::Resolver,
    roles,
    store::{self, Object, Store},
    ClusterInfo, Error, Result,
};
use ahash::AHashSet as HashSet;
use authz_controller_core::{BindingState, FanOut, Grant, ResolvedTemplate, OWNER_LABEL};
use authz_controller_k8s_api::{
    management::{
        BindingScope, ClusterRoleTemplateBinding, ProjectRoleTemplateBinding, RoleTemplateBinding,
    },
    ClusterRoleBinding, ObjectMeta, ResourceExt, RoleBinding, RoleRef, Selector, Subject,
};
use authz_controller_k8s_index::SharedIndex;
use std::sync::Arc;

/// Either binding kind.
pub trait Binding: RoleTemplateBinding + Object {}

impl<B: RoleTemplateBinding + Object> Binding for B {}

/// A native object that binds a subject to a role.
pub(crate) trait GrantObject: Object {
    /// Whether the object is a namespaced `RoleBinding`, which may reference a namespaced `Role`.
    const NAMESPACED: bool;

    fn new(metadata: ObjectMeta, role_ref: RoleRef, subject: Subject) -> Self;

    fn granted_role(&self) -> &RoleRef;

    fn subjects_mut(&mut self) -> &mut Option<Vec<Subject>>;
}

/// Reconciles bindings, namespaces and templates against the object store.
///
/// The reconciler holds no state of its own besides the shared index; every handler reads the
/// current state from the store and writes only what differs.
#[derive(Clone)]
pub struct Reconciler<S> {
    pub(crate) store: S,
    pub(crate) index: SharedIndex,
    pub(crate) cluster: Arc<ClusterInfo>,
}

// === impl Reconciler ===

impl<S: Store> Reconciler<S> {
    pub fn new(store: S, index: SharedIndex, cluster: ClusterInfo) -> Self {
        Self {
            store,
            index,
            cluster: Arc::new(cluster),
        }
    }

    pub async fn sync_project_binding(&self, namespace: &str, name: &str) -> Result<()> {
        let binding = self
            .store
            .get::<ProjectRoleTemplateBinding>(Some(namespace), name)
            .await?;
        self.sync_binding(binding).await
    }

    pub async fn sync_cluster_binding(&self, namespace: &str, name: &str) -> Result<()> {
        let binding = self
            .store
            .get::<ClusterRoleTemplateBinding>(Some(namespace), name)
            .await?;
        self.sync_binding(binding).await
    }

    async fn sync_binding<B: Binding>(&self, binding: Option<B>) -> Result<()> {
        let Some(binding) = binding else {
            return Ok(());
        };
        match BindingState::of(Some(&binding)) {
            BindingState::Active => {
                let mut resolver = Resolver::new(&self.store);
                self.ensure(&binding, &mut resolver).await
            }
            BindingState::Terminating => finalizer::cleanup(&self.store, &binding).await,
            BindingState::Gone => Ok(()),
        }
    }

    /// Materializes a live binding's grant in every scope of its fan-out and prunes the grants it
    /// no longer confers.
    ///
    /// A misconfigured binding fails with [`Error::Configuration`] without writing anything but
    /// its finalizer.
    #[tracing::instrument(
        skip_all,
        fields(kind = %B::kind(&()), namespace = ?binding.namespace(), name = %binding.name_unchecked()),
    )]
    pub async fn ensure<B: Binding>(
        &self,
        binding: &B,
        resolver: &mut Resolver<'_, S>,
    ) -> Result<()> {
        let namespace = binding.namespace();
        let name = binding.name_unchecked();
        finalizer::attach::<_, B>(&self.store, namespace.as_deref(), &name).await?;

        let uid = validate(binding)?;
        let resolved = resolver.resolve(binding.role_template_name()).await?;

        let fan_out = self.fan_out(binding.scope());
        let mut errors = Errors::default();
        if fan_out.is_empty() {
            tracing::debug!("Project has no namespaces");
        } else {
            errors.record(roles::ensure_roles(&self.store, &resolved, &fan_out).await);
            errors.record(psp::ensure_psps(&self.store, &resolved.rules, uid).await);
        }

        let subject = binding.subject();
        match binding.scope() {
            BindingScope::Project(_) => {
                self.ensure_grants::<RoleBinding>(subject, uid, &resolved, &fan_out, &mut errors)
                    .await
            }
            BindingScope::Cluster => {
                self.ensure_grants::<ClusterRoleBinding>(
                    subject,
                    uid,
                    &resolved,
                    &fan_out,
                    &mut errors,
                )
                .await
            }
        }

        errors.into_result()
    }

    pub(crate) fn fan_out(&self, scope: BindingScope<'_>) -> FanOut {
        match scope {
            BindingScope::Cluster => FanOut::Cluster,
            BindingScope::Project(project) => {
                FanOut::Namespaces(self.index.read().project_namespaces(project))
            }
        }
    }

    /// Creates a binding object for each grant in each scope, then deletes this binding's objects
    /// that are no longer desired.
    async fn ensure_grants<K: GrantObject>(
        &self,
        subject: &Subject,
        uid: &str,
        resolved: &ResolvedTemplate,
        fan_out: &FanOut,
        errors: &mut Errors,
    ) {
        let grants = resolved.grants();
        let mut desired = HashSet::new();
        if !fan_out.is_empty() {
            for scope in fan_out.scopes() {
                for grant in &grants {
                    let name = grant.binding_name(&subject.name, uid);
                    let result = ensure_grant::<S, K>(&self.store, scope, &name, grant, subject, uid);
                    errors.record(result.await);
                    desired.insert((scope.map(str::to_string), name));
                }
            }
        }

        let selector = Selector::matching(OWNER_LABEL, uid);
        let Some(owned) = errors.record(self.store.list::<K>(None, &selector).await) else {
            return;
        };
        for object in owned {
            let key = (object.namespace(), object.name_unchecked());
            if desired.contains(&key) {
                continue;
            }
            let (namespace, name) = key;
            tracing::info!(kind = %K::kind(&()), ?namespace, %name, "Deleting stale grant");
            errors.record(
                store::delete_if_exists::<S, K>(&self.store, namespace.as_deref(), &name).await,
            );
        }
    }
}

/// Returns the binding's UID if the binding is well-formed.
fn validate<B: Binding>(binding: &B) -> Result<&str> {
    if binding.role_template_name().is_empty() {
        return Err(Error::Configuration(format!(
            "{} {} has no role template",
            B::kind(&()),
            binding.name_any()
        )));
    }
    let subject = binding.subject();
    if subject.name.is_empty() || subject.kind.is_empty() {
        return Err(Error::Configuration(format!(
            "{} {} has no subject",
            B::kind(&()),
            binding.name_any()
        )));
    }
    binding.meta().uid.as_deref().ok_or_else(|| {
        Error::Configuration(format!("{} {} has no UID", B::kind(&()), binding.name_any()))
    })
}

/// Ensures the named binding object grants exactly `grant` to `subject`.
///
/// Subjects that have drifted are updated in place. An object that references another role is
/// replaced, since the role reference of a binding object cannot be changed.
async fn ensure_grant<S: Store, K: GrantObject>(
    store: &S,
    namespace: Option<&str>,
    name: &str,
    grant: &Grant,
    subject: &Subject,
    uid: &str,
) -> Result<()> {
    let role_ref = grant.role_ref(K::NAMESPACED);
    let subjects = Some(vec![subject.clone()]);
    match store.get::<K>(namespace, name).await? {
        Some(mut existing) if *existing.granted_role() == role_ref => {
            if *existing.subjects_mut() == subjects {
                return Ok(());
            }
            *existing.subjects_mut() = subjects;
            tracing::info!(kind = %K::kind(&()), ?namespace, %name, "Updating grant subjects");
            return store.update(existing).await.map(|_| ());
        }
        Some(existing) => {
            tracing::info!(
                kind = %K::kind(&()),
                ?namespace,
                %name,
                from = %existing.granted_role().name,
                to = %role_ref.name,
                "Replacing grant",
            );
            store::delete_if_exists::<S, K>(store, namespace, name).await?;
        }
        None => {}
    }

    let metadata = ObjectMeta {
        name: Some(name.to_string()),
        namespace: namespace.map(Into::into),
        labels: Some(Some((OWNER_LABEL.to_string(), uid.to_string())).into_iter().collect()),
        ..Default::default()
    };
    let object = K::new(metadata, role_ref, subject.clone());
    tracing::info!(kind = %K::kind(&()), ?namespace, %name, role = %grant.role, "Creating grant");
    match store.create(object).await {
        Err(error) if error.is_already_exists() => Ok(()),
        result => result.map(|_| ()),
    }
}

impl GrantObject for RoleBinding {
    const NAMESPACED: bool = true;

    fn new(metadata: ObjectMeta, role_ref: RoleRef, subject: Subject) -> Self {
        Self {
            metadata,
            role_ref,
            subjects: Some(vec![subject]),
        }
    }

    fn granted_role(&self) -> &RoleRef {
        &self.role_ref
    }

    fn subjects_mut(&mut self) -> &mut Option<Vec<Subject>> {
        &mut self.subjects
    }
}

impl GrantObject for ClusterRoleBinding {
    const NAMESPACED: bool = false;

    fn new(metadata: ObjectMeta, role_ref: RoleRef, subject: Subject) -> Self {
        Self {
            metadata,
            role_ref,
            subjects: Some(vec![subject]),
        }
    }

    fn granted_role(&self) -> &RoleRef {
        &self.role_ref
    }

    fn subjects_mut(&mut self) -> &mut Option<Vec<Subject>> {
        &mut self.subjects
    }
}
