use crate::{
    binding::{Binding, Reconciler},
    error::Errors,
    finalizer,
    resolve::Resolver,
    store::{self, Store},
    Result,
};
use authz_controller_core::{BindingState, TEMPLATE_LABEL};
use authz_controller_k8s_api::{management::RoleTemplate, ClusterRole, Role, Selector};

impl<S: Store> Reconciler<S> {
    /// Handles a role template change.
    ///
    /// A live template carries our finalizer, so a deletion is observed even if it happens while
    /// the controller is down: the roles rendered from a terminating template are removed before
    /// the finalizer is released.
    ///
    /// Every live binding whose resolution reaches a live template is re-ensured so that rendered
    /// roles and grants follow the new template graph. Roles rendered from a template that has
    /// since become builtin are removed.
    #[tracing::instrument(skip(self))]
    pub async fn sync_role_template(&self, name: &str) -> Result<()> {
        let Some(template) = self.store.get::<RoleTemplate>(None, name).await? else {
            return self.remove_rendered_roles(name).await;
        };
        if template.metadata.deletion_timestamp.is_some() {
            self.remove_rendered_roles(name).await?;
            tracing::info!("Releasing role template");
            return finalizer::release::<S, RoleTemplate>(&self.store, None, name).await;
        }
        finalizer::attach::<S, RoleTemplate>(&self.store, None, name).await?;

        let (project_bindings, cluster_bindings) = {
            let index = self.index.read();
            (index.all_project_bindings(), index.cluster_bindings())
        };

        let mut resolver = Resolver::new(&self.store);
        let mut errors = Errors::default();
        for binding in &project_bindings {
            self.refresh(binding, name, &mut resolver, &mut errors)
                .await;
        }
        for binding in &cluster_bindings {
            self.refresh(binding, name, &mut resolver, &mut errors)
                .await;
        }
        if template.spec.builtin {
            errors.record(self.remove_rendered_roles(name).await);
        }
        errors.into_result()
    }

    async fn refresh<B: Binding>(
        &self,
        binding: &B,
        template: &str,
        resolver: &mut Resolver<'_, S>,
        errors: &mut Errors,
    ) {
        if BindingState::of(Some(binding)) != BindingState::Active {
            return;
        }
        match resolver.resolve(binding.role_template_name()).await {
            Ok(resolved) if resolved.references(template) => {
                errors.record_retryable(self.ensure(binding, resolver).await);
            }
            Ok(_) => {}
            // The binding's own handler reports its resolution failures.
            Err(error) => tracing::debug!(%error, "Failed to resolve binding template"),
        }
    }

    async fn remove_rendered_roles(&self, name: &str) -> Result<()> {
        let selector = Selector::matching(TEMPLATE_LABEL, name);
        let mut errors = Errors::default();
        errors.record(store::delete_matching::<S, Role>(&self.store, &selector).await);
        errors.record(store::delete_matching::<S, ClusterRole>(&self.store, &selector).await);
        errors.into_result()
    }
}
