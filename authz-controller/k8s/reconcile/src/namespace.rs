use crate::{
    binding::Reconciler,
    error::Errors,
    resolve::Resolver,
    store::{self, Store},
    Error, Result,
};
use authz_controller_core::{BindingState, DEFAULT_NAMESPACE_ASSIGNED, PROJECT_LABEL};
use authz_controller_k8s_api::{management::Cluster, Namespace, ResourceExt};

fn project_of(ns: &Namespace) -> Option<&str> {
    ns.labels()
        .get(PROJECT_LABEL)
        .map(String::as_str)
        .filter(|p| !p.is_empty())
}

impl<S: Store> Reconciler<S> {
    /// Handles a namespace change.
    ///
    /// The bootstrap namespace is assigned to the default project once per cluster. A namespace
    /// that belongs to a project receives the grants of every live binding of that project.
    #[tracing::instrument(skip(self))]
    pub async fn sync_namespace(&self, name: &str) -> Result<()> {
        let Some(mut ns) = self.store.get::<Namespace>(None, name).await? else {
            return Ok(());
        };
        if ns.metadata.deletion_timestamp.is_some() {
            return Ok(());
        }

        if name == self.cluster.bootstrap_namespace {
            ns = self.assign_default_project(ns).await?;
        }

        let Some(project) = project_of(&ns) else {
            return Ok(());
        };
        let bindings = self.index.read().project_bindings(project);
        tracing::debug!(%project, bindings = bindings.len(), "Granting project bindings");

        let mut resolver = Resolver::new(&self.store);
        let mut errors = Errors::default();
        for binding in bindings {
            if BindingState::of(Some(&binding)) != BindingState::Active {
                continue;
            }
            errors.record_retryable(self.ensure(&binding, &mut resolver).await);
        }
        errors.into_result()
    }

    async fn assign_default_project(&self, ns: Namespace) -> Result<Namespace> {
        let cluster_name = &self.cluster.cluster_name;
        let mut cluster = self
            .store
            .get::<Cluster>(None, cluster_name)
            .await?
            .ok_or_else(|| Error::not_found("Cluster", cluster_name))?;
        if cluster.is_condition_true(DEFAULT_NAMESPACE_ASSIGNED) {
            return Ok(ns);
        }

        let ns = if project_of(&ns).is_some() {
            ns
        } else {
            let project = self.cluster.default_project.clone();
            tracing::info!(%project, "Assigning bootstrap namespace to default project");
            store::update_with::<S, Namespace, _>(
                &self.store,
                None,
                &ns.name_unchecked(),
                move |ns| {
                    if project_of(ns).is_some() {
                        return false;
                    }
                    ns.labels_mut().insert(PROJECT_LABEL.to_string(), project);
                    true
                },
            )
            .await?
        };

        let now = chrono::Utc::now().to_rfc3339();
        if cluster.set_condition_true(DEFAULT_NAMESPACE_ASSIGNED, "Assigned", now) {
            self.store.update_status(cluster).await?;
        }
        Ok(ns)
    }
}
