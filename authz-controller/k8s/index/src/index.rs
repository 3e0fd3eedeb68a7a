use ahash::AHashMap as HashMap;
use authz_controller_core::PROJECT_LABEL;
use authz_controller_k8s_api::{
    management::{ClusterRoleTemplateBinding, ProjectRoleTemplateBinding, RoleTemplate},
    Namespace, ResourceExt,
};
use parking_lot::RwLock;
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    sync::Arc,
};
use tokio::sync::mpsc::UnboundedSender;

pub type SharedIndex = Arc<RwLock<Index>>;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId {
    pub namespace: String,
    pub name: String,
}

/// Identifies an object that must be reconciled.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Update {
    RoleTemplate(String),
    ProjectBinding(ResourceId),
    ClusterBinding(ResourceId),
    Namespace(String),
}

pub struct Index {
    updates: UnboundedSender<Update>,

    /// Maps each known namespace to the project it is labeled with, if any.
    namespaces: HashMap<String, Option<String>>,

    projects: HashMap<String, Project>,

    /// Maps each project binding to the project it is indexed under, so that a binding that is
    /// moved to another project can be found and removed from the old one.
    binding_projects: HashMap<ResourceId, String>,

    cluster_bindings: BTreeMap<ResourceId, ClusterRoleTemplateBinding>,

    templates: BTreeSet<String>,
}

#[derive(Debug, Default)]
struct Project {
    namespaces: BTreeSet<String>,
    bindings: BTreeMap<ResourceId, ProjectRoleTemplateBinding>,
}

// === impl ResourceId ===

impl ResourceId {
    pub fn new(namespace: String, name: String) -> Self {
        Self { namespace, name }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

// === impl Update ===

impl Update {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RoleTemplate(_) => "roletemplate",
            Self::ProjectBinding(_) => "projectroletemplatebinding",
            Self::ClusterBinding(_) => "clusterroletemplatebinding",
            Self::Namespace(_) => "namespace",
        }
    }
}

impl fmt::Display for Update {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RoleTemplate(name) | Self::Namespace(name) => write!(f, "{}/{name}", self.kind()),
            Self::ProjectBinding(id) | Self::ClusterBinding(id) => {
                write!(f, "{}/{id}", self.kind())
            }
        }
    }
}

// === impl Index ===

impl Index {
    pub fn shared(updates: UnboundedSender<Update>) -> SharedIndex {
        Arc::new(RwLock::new(Self {
            updates,
            namespaces: HashMap::new(),
            projects: HashMap::new(),
            binding_projects: HashMap::new(),
            cluster_bindings: BTreeMap::new(),
            templates: BTreeSet::new(),
        }))
    }

    /// Returns the namespaces labeled as members of `project`.
    pub fn project_namespaces(&self, project: &str) -> BTreeSet<String> {
        self.projects
            .get(project)
            .map(|p| p.namespaces.clone())
            .unwrap_or_default()
    }

    /// Returns the bindings that grant roles in `project`.
    pub fn project_bindings(&self, project: &str) -> Vec<ProjectRoleTemplateBinding> {
        self.projects
            .get(project)
            .map(|p| p.bindings.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn all_project_bindings(&self) -> Vec<ProjectRoleTemplateBinding> {
        self.projects
            .values()
            .flat_map(|p| p.bindings.values().cloned())
            .collect()
    }

    pub fn cluster_bindings(&self) -> Vec<ClusterRoleTemplateBinding> {
        self.cluster_bindings.values().cloned().collect()
    }

    pub(crate) fn namespace_count(&self) -> usize {
        self.namespaces.len()
    }

    pub(crate) fn template_count(&self) -> usize {
        self.templates.len()
    }

    pub(crate) fn project_binding_count(&self) -> usize {
        self.binding_projects.len()
    }

    pub(crate) fn cluster_binding_count(&self) -> usize {
        self.cluster_bindings.len()
    }

    /// Publishes an update for every indexed object so that drift is healed even when nothing
    /// changes.
    pub fn resync(&self) {
        tracing::debug!(
            templates = self.templates.len(),
            namespaces = self.namespaces.len(),
            cluster_bindings = self.cluster_bindings.len(),
            project_bindings = self.binding_projects.len(),
            "Resyncing"
        );
        for name in &self.templates {
            self.notify(Update::RoleTemplate(name.clone()));
        }
        for id in self.binding_projects.keys() {
            self.notify(Update::ProjectBinding(id.clone()));
        }
        for id in self.cluster_bindings.keys() {
            self.notify(Update::ClusterBinding(id.clone()));
        }
        for name in self.namespaces.keys() {
            self.notify(Update::Namespace(name.clone()));
        }
    }

    fn notify(&self, update: Update) {
        if let Err(error) = self.updates.send(update) {
            tracing::error!(update = %error.0, "Failed to publish update");
        }
    }

    fn project_mut(&mut self, project: &str) -> &mut Project {
        self.projects.entry(project.to_string()).or_default()
    }

    fn gc_project(&mut self, project: &str) {
        if let Some(p) = self.projects.get(project) {
            if p.namespaces.is_empty() && p.bindings.is_empty() {
                self.projects.remove(project);
            }
        }
    }

    /// Removes a namespace from its previous project. The project's bindings are notified so that
    /// they can prune the grants they made in the namespace.
    fn leave_project(&mut self, namespace: &str, project: &str) {
        let ids = match self.projects.get_mut(project) {
            Some(p) => {
                p.namespaces.remove(namespace);
                p.bindings.keys().cloned().collect::<Vec<_>>()
            }
            None => return,
        };
        tracing::debug!(%namespace, %project, "Namespace left project");
        for id in ids {
            self.notify(Update::ProjectBinding(id));
        }
        self.gc_project(project);
    }

    fn remove_project_binding(&mut self, id: &ResourceId) {
        if let Some(project) = self.binding_projects.remove(id) {
            if let Some(p) = self.projects.get_mut(&project) {
                p.bindings.remove(id);
            }
            self.gc_project(&project);
        }
    }
}

impl kubert::index::IndexClusterResource<Namespace> for Index {
    fn apply(&mut self, ns: Namespace) {
        let name = ns.name_unchecked();
        let project = ns
            .labels()
            .get(PROJECT_LABEL)
            .filter(|p| !p.is_empty())
            .cloned();

        let previous = self.namespaces.insert(name.clone(), project.clone());
        if let Some(Some(previous)) = previous {
            if Some(&previous) != project.as_ref() {
                self.leave_project(&name, &previous);
            }
        }
        if let Some(project) = project {
            self.project_mut(&project).namespaces.insert(name.clone());
        }

        self.notify(Update::Namespace(name));
    }

    fn delete(&mut self, name: String) {
        if let Some(Some(project)) = self.namespaces.remove(&name) {
            if let Some(p) = self.projects.get_mut(&project) {
                p.namespaces.remove(&name);
            }
            self.gc_project(&project);
        }
    }
}

impl kubert::index::IndexNamespacedResource<ProjectRoleTemplateBinding> for Index {
    fn apply(&mut self, binding: ProjectRoleTemplateBinding) {
        let namespace = binding
            .namespace()
            .expect("ProjectRoleTemplateBinding must have a namespace");
        let id = ResourceId::new(namespace, binding.name_unchecked());
        let project = binding.spec.project_name.clone();

        if self.binding_projects.get(&id) != Some(&project) {
            self.remove_project_binding(&id);
            self.binding_projects.insert(id.clone(), project.clone());
        }
        self.project_mut(&project)
            .bindings
            .insert(id.clone(), binding);

        self.notify(Update::ProjectBinding(id));
    }

    fn delete(&mut self, namespace: String, name: String) {
        self.remove_project_binding(&ResourceId::new(namespace, name));
    }
}

impl kubert::index::IndexNamespacedResource<ClusterRoleTemplateBinding> for Index {
    fn apply(&mut self, binding: ClusterRoleTemplateBinding) {
        let namespace = binding
            .namespace()
            .expect("ClusterRoleTemplateBinding must have a namespace");
        let id = ResourceId::new(namespace, binding.name_unchecked());
        self.cluster_bindings.insert(id.clone(), binding);
        self.notify(Update::ClusterBinding(id));
    }

    fn delete(&mut self, namespace: String, name: String) {
        self.cluster_bindings
            .remove(&ResourceId::new(namespace, name));
    }
}

impl kubert::index::IndexClusterResource<RoleTemplate> for Index {
    fn apply(&mut self, template: RoleTemplate) {
        let name = template.name_unchecked();
        self.templates.insert(name.clone());
        self.notify(Update::RoleTemplate(name));
    }

    // Deleted templates are still published so that the roles rendered from them are removed.
    fn delete(&mut self, name: String) {
        self.templates.remove(&name);
        self.notify(Update::RoleTemplate(name));
    }
}
