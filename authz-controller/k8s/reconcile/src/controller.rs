use crate::{binding::Reconciler, metrics::ControllerMetrics, store::Store, Result};
use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use authz_controller_k8s_index::Update;
use tokio::{
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    time::{self, Duration},
};
use tracing::{info_span, Instrument};

/// Delays between attempts to reconcile a failing object: `base`, doubled after each failure and
/// capped at `max`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
}

/// Dispatches updates from the index to the reconciler.
///
/// Updates are handled one at a time, so an object is never reconciled concurrently with itself.
/// A retryable failure is retried after a backoff. At most one retry is pending per key, however
/// often the key is redelivered while it keeps failing.
pub struct Controller<S> {
    reconciler: Reconciler<S>,
    updates: UnboundedReceiver<Update>,
    retries_tx: UnboundedSender<Update>,
    retries_rx: UnboundedReceiver<Update>,
    pending: HashSet<Update>,
    backoff: Backoff,
    failures: HashMap<Update, u32>,
    metrics: ControllerMetrics,
}

// === impl Backoff ===

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(5 * 60),
        }
    }
}

impl Backoff {
    /// The delay before the retry that follows the `failures`-th consecutive failure.
    pub fn delay(&self, failures: u32) -> Duration {
        let factor = 2u32.saturating_pow(failures.saturating_sub(1));
        self.base.saturating_mul(factor).min(self.max)
    }
}

// === impl Controller ===

impl<S: Store> Controller<S> {
    pub fn new(
        reconciler: Reconciler<S>,
        updates: UnboundedReceiver<Update>,
        backoff: Backoff,
        metrics: ControllerMetrics,
    ) -> Self {
        let (retries_tx, retries_rx) = mpsc::unbounded_channel();
        Self {
            reconciler,
            updates,
            retries_tx,
            retries_rx,
            pending: HashSet::new(),
            backoff,
            failures: HashMap::new(),
            metrics,
        }
    }

    /// Processes updates until the update channel closes. Pending retries are dropped then.
    pub async fn run(mut self) {
        loop {
            let update = tokio::select! {
                biased;
                update = self.updates.recv() => match update {
                    Some(update) => update,
                    None => break,
                },
                Some(update) = self.retries_rx.recv() => {
                    self.pending.remove(&update);
                    update
                }
            };
            self.process(update).await;
        }
        tracing::debug!("Update channel closed");
    }

    async fn process(&mut self, update: Update) {
        let kind = update.kind();
        let start = time::Instant::now();
        let span = info_span!("reconcile", %update);
        let result = reconcile(&self.reconciler, &update).instrument(span).await;

        match result {
            Ok(()) => {
                self.failures.remove(&update);
                self.metrics.observe(kind, "success", start);
            }

            Err(error) if error.is_retryable() => {
                self.metrics.observe(kind, "retry", start);
                let failures = self.failures.entry(update.clone()).or_default();
                *failures += 1;
                let delay = self.backoff.delay(*failures);
                if !self.pending.insert(update.clone()) {
                    tracing::debug!(%update, %error, "Reconciliation failed; retry already scheduled");
                    return;
                }
                self.metrics.requeued(kind);
                tracing::error!(%update, %error, ?delay, "Reconciliation failed");

                let retries = self.retries_tx.clone();
                tokio::spawn(async move {
                    time::sleep(delay).await;
                    // Fails only once the controller has stopped.
                    let _ = retries.send(update);
                });
            }

            Err(error) => {
                self.failures.remove(&update);
                self.metrics.observe(kind, "failure", start);
                tracing::warn!(%update, %error, "Reconciliation failed permanently");
            }
        }
    }
}

async fn reconcile<S: Store>(reconciler: &Reconciler<S>, update: &Update) -> Result<()> {
    match update {
        Update::RoleTemplate(name) => reconciler.sync_role_template(name).await,
        Update::ProjectBinding(id) => {
            reconciler
                .sync_project_binding(&id.namespace, &id.name)
                .await
        }
        Update::ClusterBinding(id) => {
            reconciler
                .sync_cluster_binding(&id.namespace, &id.name)
                .await
        }
        Update::Namespace(name) => reconciler.sync_namespace(name).await,
    }
}
