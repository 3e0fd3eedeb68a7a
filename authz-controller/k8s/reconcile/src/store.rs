use crate::{error::Errors, Error, Result};
use authz_controller_k8s_api::{
    self as k8s,
    management::{
        Cluster, ClusterRoleTemplateBinding, PodSecurityPolicyTemplate,
        ProjectRoleTemplateBinding, RoleTemplate,
    },
    policy::PodSecurityPolicy,
    ClusterRole, ClusterRoleBinding, Namespace, Resource, Role, RoleBinding, Selector,
};
use kube::api::{DeleteParams, ListParams, Patch, PatchParams, PostParams};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt;

/// A resource kind that can be read and written through a [`Store`].
pub trait Object:
    Resource<DynamicType = ()>
    + Clone
    + fmt::Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// Builds an API handle for the kind. Namespaced kinds address all namespaces when no
    /// namespace is given.
    fn api(client: k8s::Client, namespace: Option<&str>) -> k8s::Api<Self>;
}

macro_rules! namespaced_objects {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl Object for $ty {
                fn api(client: k8s::Client, namespace: Option<&str>) -> k8s::Api<Self> {
                    match namespace {
                        Some(ns) => k8s::Api::namespaced(client, ns),
                        None => k8s::Api::all(client),
                    }
                }
            }
        )+
    };
}

macro_rules! cluster_objects {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl Object for $ty {
                fn api(client: k8s::Client, _: Option<&str>) -> k8s::Api<Self> {
                    k8s::Api::all(client)
                }
            }
        )+
    };
}

namespaced_objects!(
    Role,
    RoleBinding,
    ProjectRoleTemplateBinding,
    ClusterRoleTemplateBinding,
);

cluster_objects!(
    Namespace,
    ClusterRole,
    ClusterRoleBinding,
    PodSecurityPolicy,
    RoleTemplate,
    PodSecurityPolicyTemplate,
    Cluster,
);

/// Typed access to the cluster's object store.
///
/// Absence is reported as `None` by `get` and as [`Error::NotFound`] by writes. Updates carry the
/// object's `resourceVersion` and fail with [`Error::Conflict`] when it is stale.
#[async_trait::async_trait]
pub trait Store: Clone + Send + Sync + 'static {
    async fn get<K: Object>(&self, namespace: Option<&str>, name: &str) -> Result<Option<K>>;

    async fn list<K: Object>(&self, namespace: Option<&str>, selector: &Selector)
        -> Result<Vec<K>>;

    async fn create<K: Object>(&self, object: K) -> Result<K>;

    async fn update<K: Object>(&self, object: K) -> Result<K>;

    async fn update_status<K: Object>(&self, object: K) -> Result<K>;

    async fn delete<K: Object>(&self, namespace: Option<&str>, name: &str) -> Result<()>;
}

/// Fetches the latest version of an object and writes it back if `mutate` reports a change.
///
/// A concurrent write between the read and the update surfaces as [`Error::Conflict`]; the caller
/// is expected to be redelivered and recompute from fresh state.
pub async fn update_with<S, K, F>(
    store: &S,
    namespace: Option<&str>,
    name: &str,
    mutate: F,
) -> Result<K>
where
    S: Store,
    K: Object,
    F: FnOnce(&mut K) -> bool + Send,
{
    let mut object = store
        .get::<K>(namespace, name)
        .await?
        .ok_or_else(|| Error::not_found(K::kind(&()), name))?;
    if !mutate(&mut object) {
        return Ok(object);
    }
    store.update(object).await
}

/// Deletes an object, treating its absence as success.
pub async fn delete_if_exists<S: Store, K: Object>(
    store: &S,
    namespace: Option<&str>,
    name: &str,
) -> Result<()> {
    match store.delete::<K>(namespace, name).await {
        Err(error) if error.is_not_found() => Ok(()),
        result => result,
    }
}

/// Deletes every object of kind `K` matching `selector`, in all namespaces.
///
/// Every deletion is attempted; the first failure is returned.
pub async fn delete_matching<S: Store, K: Object>(store: &S, selector: &Selector) -> Result<()> {
    let mut errors = Errors::default();
    for object in store.list::<K>(None, selector).await? {
        let (namespace, name) = key(&object);
        tracing::info!(kind = %K::kind(&()), ?namespace, %name, "Deleting");
        errors.record(delete_if_exists::<S, K>(store, namespace.as_deref(), &name).await);
    }
    errors.into_result()
}

/// A [`Store`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeStore {
    client: k8s::Client,
}

// === impl KubeStore ===

impl KubeStore {
    pub fn new(client: k8s::Client) -> Self {
        Self { client }
    }
}

fn code(error: &kube::Error) -> Option<u16> {
    match error {
        kube::Error::Api(response) => Some(response.code),
        _ => None,
    }
}

fn key<K: Object>(object: &K) -> (Option<String>, String) {
    let meta = object.meta();
    (meta.namespace.clone(), meta.name.clone().unwrap_or_default())
}

fn write_error<K: Object>(error: kube::Error, name: &str) -> Error {
    let kind = K::kind(&()).to_string();
    let name = name.to_string();
    match code(&error) {
        Some(404) => Error::NotFound { kind, name },
        Some(409) => Error::Conflict { kind, name },
        _ => Error::Api(error),
    }
}

#[async_trait::async_trait]
impl Store for KubeStore {
    async fn get<K: Object>(&self, namespace: Option<&str>, name: &str) -> Result<Option<K>> {
        let api = K::api(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn list<K: Object>(
        &self,
        namespace: Option<&str>,
        selector: &Selector,
    ) -> Result<Vec<K>> {
        let api = K::api(self.client.clone(), namespace);
        let params = ListParams::default().labels(&selector.to_string());
        Ok(api.list(&params).await?.items)
    }

    async fn create<K: Object>(&self, object: K) -> Result<K> {
        let (namespace, name) = key(&object);
        let api = K::api(self.client.clone(), namespace.as_deref());
        api.create(&PostParams::default(), &object)
            .await
            .map_err(|error| match code(&error) {
                Some(409) => Error::AlreadyExists {
                    kind: K::kind(&()).to_string(),
                    name,
                },
                _ => Error::Api(error),
            })
    }

    async fn update<K: Object>(&self, object: K) -> Result<K> {
        let (namespace, name) = key(&object);
        let api = K::api(self.client.clone(), namespace.as_deref());
        api.replace(&name, &PostParams::default(), &object)
            .await
            .map_err(|error| write_error::<K>(error, &name))
    }

    async fn update_status<K: Object>(&self, object: K) -> Result<K> {
        let (namespace, name) = key(&object);
        let api = K::api(self.client.clone(), namespace.as_deref());
        let value = serde_json::to_value(&object)?;
        // Carrying the resource version makes the merge patch conditional.
        let patch = serde_json::json!({
            "metadata": { "resourceVersion": object.meta().resource_version },
            "status": value.get("status").cloned().unwrap_or_default(),
        });
        api.patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|error| write_error::<K>(error, &name))
    }

    async fn delete<K: Object>(&self, namespace: Option<&str>, name: &str) -> Result<()> {
        let api = K::api(self.client.clone(), namespace);
        api.delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|error| write_error::<K>(error, name))
    }
}
