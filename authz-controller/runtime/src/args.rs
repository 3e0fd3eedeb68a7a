use crate::{
    index::{Index, IndexMetrics, SharedIndex},
    k8s::{
        management::{ClusterRoleTemplateBinding, ProjectRoleTemplateBinding, RoleTemplate},
        policy::PodSecurityPolicy,
        Client, Namespace, Resource,
    },
    reconcile::{Backoff, ClusterInfo, Controller, ControllerMetrics, KubeStore, Reconciler},
};
use anyhow::{bail, Result};
use clap::Parser;
use kube::runtime::watcher;
use prometheus_client::registry::Registry;
use tokio::{
    sync::mpsc,
    time::{self, Duration},
};
use tracing::{info_span, Instrument};

#[derive(Debug, Parser)]
#[clap(
    name = "authz",
    about = "Materializes role template bindings into native RBAC objects"
)]
pub struct Args {
    #[clap(
        long,
        default_value = "authz=info,warn",
        env = "AUTHZ_CONTROLLER_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// Names the `Cluster` resource that represents the cluster this controller runs in.
    #[clap(long, env = "AUTHZ_CLUSTER_NAME")]
    cluster_name: String,

    /// The namespace that is assigned to the default project when the cluster is first seen.
    #[clap(long, default_value = "default")]
    bootstrap_namespace: String,

    #[clap(long, default_value = "default")]
    default_project: String,

    /// Seconds between full passes over every indexed resource.
    #[clap(long, default_value = "300", value_parser = clap::value_parser!(u64).range(1..))]
    resync_period: u64,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            admin,
            client,
            log_level,
            log_format,
            cluster_name,
            bootstrap_namespace,
            default_project,
            resync_period,
        } = self;

        let cluster_info = ClusterInfo {
            cluster_name,
            bootstrap_namespace,
            default_project,
        };

        // The index publishes the key of every resource that changes. The controller consumes
        // those keys and retries failed ones itself.
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        let index = Index::shared(updates_tx);

        let mut prom = <Registry>::default();
        let authz = prom.sub_registry_with_prefix("authz");
        let controller_metrics = ControllerMetrics::register(authz);
        let indexed =
            IndexMetrics::register(index.clone(), authz.sub_registry_with_prefix("index")).shared();
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let mut runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .build()
            .await?;

        if !api_resource_exists::<PodSecurityPolicy>(&runtime.client()).await {
            tracing::warn!(
                "podsecuritypolicies.policy resource kind not found; policies cannot be propagated"
            );
        }

        // Spawn resource watches.

        let namespaces = runtime.watch_all::<Namespace>(watcher::Config::default());
        tokio::spawn(
            kubert::index::cluster(indexed.clone(), namespaces).instrument(info_span!("namespaces")),
        );

        let templates = runtime.watch_all::<RoleTemplate>(watcher::Config::default());
        tokio::spawn(
            kubert::index::cluster(indexed.clone(), templates)
                .instrument(info_span!("roletemplates")),
        );

        let project_bindings =
            runtime.watch_all::<ProjectRoleTemplateBinding>(watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(indexed.clone(), project_bindings)
                .instrument(info_span!("projectroletemplatebindings")),
        );

        let cluster_bindings =
            runtime.watch_all::<ClusterRoleTemplateBinding>(watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(indexed, cluster_bindings)
                .instrument(info_span!("clusterroletemplatebindings")),
        );

        tokio::spawn(
            resync(index.clone(), Duration::from_secs(resync_period))
                .instrument(info_span!("resync")),
        );

        let reconciler = Reconciler::new(KubeStore::new(runtime.client()), index, cluster_info);
        let controller =
            Controller::new(reconciler, updates_rx, Backoff::default(), controller_metrics);
        tokio::spawn(controller.run().instrument(info_span!("controller")));

        // Block the main thread on the shutdown signal. Once it fires, wait for the background tasks to
        // complete before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}

/// Periodically republishes every indexed key so that drift in materialized objects is repaired
/// even when no watched resource changes.
async fn resync(index: SharedIndex, period: Duration) {
    let mut interval = time::interval(period);
    interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
    // The first tick completes immediately; the initial watch events already cover it.
    interval.tick().await;
    loop {
        interval.tick().await;
        index.read().resync();
    }
}

async fn api_resource_exists<T>(client: &Client) -> bool
where
    T: Resource,
    T::DynamicType: Default,
{
    let dt = Default::default();
    client
        .list_api_group_resources(&T::api_version(&dt))
        .await
        .ok()
        .iter()
        .flat_map(|r| r.resources.iter())
        .any(|r| r.kind == T::kind(&dt))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = Args::try_parse_from(["authz", "--cluster-name=local"]).unwrap();
        assert_eq!(args.cluster_name, "local");
        assert_eq!(args.bootstrap_namespace, "default");
        assert_eq!(args.default_project, "default");
        assert_eq!(args.resync_period, 300);
    }

    #[test]
    fn rejects_zero_resync_period() {
        assert!(Args::try_parse_from(["authz", "--cluster-name=local", "--resync-period=0"]).is_err());
    }
}
