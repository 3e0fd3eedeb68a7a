use crate::Index;
use authz_controller_k8s_api::Resource;
use parking_lot::RwLock;
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, gauge::Gauge},
    registry::Registry,
};
use std::sync::Arc;

/// Wraps a shared index to count the watch events applied to it.
pub struct IndexMetrics<T> {
    inner: T,

    index_size: Family<IndexLabels, Gauge>,
    index_applies: Family<IndexLabels, Counter>,
    index_deletes: Family<IndexLabels, Counter>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct IndexLabels {
    kind: String,
}

pub trait SizedIndex<R> {
    fn size(&self) -> usize;
}

impl<T, R> SizedIndex<R> for Arc<RwLock<T>>
where
    T: SizedIndex<R>,
{
    fn size(&self) -> usize {
        self.read().size()
    }
}

impl<T> IndexMetrics<T> {
    pub fn register(inner: T, prom: &mut Registry) -> Self {
        let index_size = Family::default();
        prom.register(
            "index_size",
            "Gauge of the number of resources in the index",
            index_size.clone(),
        );

        let index_applies = Family::default();
        prom.register(
            "index_applies",
            "Count of applies to the index",
            index_applies.clone(),
        );

        let index_deletes = Family::default();
        prom.register(
            "index_deletes",
            "Count of deletes to the index",
            index_deletes.clone(),
        );

        Self {
            inner,
            index_size,
            index_applies,
            index_deletes,
        }
    }

    pub fn shared(self) -> Arc<RwLock<Self>> {
        Arc::new(RwLock::new(self))
    }

    fn labels<R: Resource<DynamicType = ()>>() -> IndexLabels {
        IndexLabels {
            kind: R::kind(&()).to_string(),
        }
    }
}

impl<T> IndexMetrics<Arc<RwLock<T>>> {
    fn record_size<R: Resource<DynamicType = ()>>(&self)
    where
        T: SizedIndex<R>,
    {
        let size = SizedIndex::<R>::size(&self.inner);
        self.index_size
            .get_or_create(&Self::labels::<R>())
            .set(size as i64);
    }
}

impl<R, T> kubert::index::IndexClusterResource<R> for IndexMetrics<Arc<RwLock<T>>>
where
    T: SizedIndex<R>,
    T: kubert::index::IndexClusterResource<R>,
    R: Resource<DynamicType = ()>,
{
    fn apply(&mut self, resource: R) {
        self.index_applies.get_or_create(&Self::labels::<R>()).inc();
        self.inner.write().apply(resource);
        self.record_size::<R>();
    }

    fn delete(&mut self, name: String) {
        self.index_deletes.get_or_create(&Self::labels::<R>()).inc();
        self.inner.write().delete(name);
        self.record_size::<R>();
    }
}

impl<R, T> kubert::index::IndexNamespacedResource<R> for IndexMetrics<Arc<RwLock<T>>>
where
    T: SizedIndex<R>,
    T: kubert::index::IndexNamespacedResource<R>,
    R: Resource<DynamicType = ()>,
{
    fn apply(&mut self, resource: R) {
        self.index_applies.get_or_create(&Self::labels::<R>()).inc();
        self.inner.write().apply(resource);
        self.record_size::<R>();
    }

    fn delete(&mut self, namespace: String, name: String) {
        self.index_deletes.get_or_create(&Self::labels::<R>()).inc();
        self.inner.write().delete(namespace, name);
        self.record_size::<R>();
    }
}

// === impl Index ===

impl SizedIndex<authz_controller_k8s_api::Namespace> for Index {
    fn size(&self) -> usize {
        self.namespace_count()
    }
}

impl SizedIndex<authz_controller_k8s_api::management::RoleTemplate> for Index {
    fn size(&self) -> usize {
        self.template_count()
    }
}

impl SizedIndex<authz_controller_k8s_api::management::ProjectRoleTemplateBinding> for Index {
    fn size(&self) -> usize {
        self.project_binding_count()
    }
}

impl SizedIndex<authz_controller_k8s_api::management::ClusterRoleTemplateBinding> for Index {
    fn size(&self) -> usize {
        self.cluster_binding_count()
    }
}
