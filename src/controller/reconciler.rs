//! ClusterConfig Reconciler
//!
//! Runs the finalizer lifecycle, the data export and the host image
//! sync in that order, stopping at the first step that asks to requeue.
//! [`run_controller`] hooks it up to `kube::runtime`.

use super::config::{image_url, ControllerConfig};
use super::exporter::DataExporter;
use super::finalizer::{FinalizerLifecycle, LifecycleStep};
use super::host_sync::HostImageSync;
use super::mapper::{configs_for_host, is_tombstone};
use super::metrics::ControllerMetrics;
use crate::crd::{BareMetalHost, ClusterConfig};
use crate::domain::ports::{ClusterStoreRef, ObjectKey, ReconcileOutcome};
use crate::error::{Error, ErrorAction, Result};
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use dashmap::DashMap;
use futures::StreamExt;
use kube::runtime::controller::Action;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::{watcher, Controller};
use kube::{Api, Client};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Longest delay between retries of a failing ClusterConfig
pub const MAX_ERROR_BACKOFF: Duration = Duration::from_secs(300);

const INITIAL_ERROR_BACKOFF: Duration = Duration::from_millis(500);

// =============================================================================
// Reconciler
// =============================================================================

/// Converges one ClusterConfig at a time
pub struct Reconciler {
    store: ClusterStoreRef,
    exporter: DataExporter,
    hosts: HostImageSync,
    service_url: String,
}

impl Reconciler {
    pub fn new(store: ClusterStoreRef, config: &ControllerConfig) -> Self {
        Self {
            exporter: DataExporter::new(config.data_dir(), store.clone()),
            hosts: HostImageSync::new(store.clone()),
            service_url: config.service_url(),
            store,
        }
    }

    /// Reconcile the ClusterConfig named by `key`
    pub async fn reconcile_key(&self, key: &ObjectKey) -> Result<ReconcileOutcome> {
        let span = info_span!("reconcile", namespace = %key.namespace, name = %key.name);
        self.run(key).instrument(span).await
    }

    async fn run(&self, key: &ObjectKey) -> Result<ReconcileOutcome> {
        info!("Running reconcile");

        let Some(config) = self.store.get_config(key).await? else {
            debug!("ClusterConfig not found, assuming it was deleted");
            return Ok(ReconcileOutcome::NoOp);
        };

        let lifecycle = FinalizerLifecycle::new(&self.store, &self.exporter, &self.hosts);
        if let LifecycleStep::Halt(outcome) = lifecycle.step(&config).await? {
            return Ok(outcome);
        }

        let exported = self.exporter.export(&config).await?;
        if exported.is_requeue() {
            return Ok(exported);
        }

        if let Some(host_ref) = &config.spec.bare_metal_host_ref {
            let url = image_url(&self.service_url, key);
            self.hosts.set_image(host_ref, &url).await?;
        }

        info!("Reconcile complete");
        Ok(ReconcileOutcome::NoOp)
    }
}

// =============================================================================
// Controller Runtime
// =============================================================================

/// Shared state handed to every reconcile by `kube::runtime`
pub struct Context {
    reconciler: Reconciler,
    metrics: ControllerMetrics,
    backoffs: DashMap<ObjectKey, ExponentialBackoff>,
}

impl Context {
    pub fn new(reconciler: Reconciler, metrics: ControllerMetrics) -> Self {
        Self {
            reconciler,
            metrics,
            backoffs: DashMap::new(),
        }
    }

    /// Next retry delay for a failing object
    fn next_backoff(&self, key: &ObjectKey) -> Duration {
        let mut backoff = self
            .backoffs
            .entry(key.clone())
            .or_insert_with(error_backoff);
        backoff.next_backoff().unwrap_or(MAX_ERROR_BACKOFF)
    }
}

fn error_backoff() -> ExponentialBackoff {
    ExponentialBackoff {
        initial_interval: INITIAL_ERROR_BACKOFF,
        current_interval: INITIAL_ERROR_BACKOFF,
        max_interval: MAX_ERROR_BACKOFF,
        max_elapsed_time: None,
        ..Default::default()
    }
}

/// Requeue decision for a successful reconcile
pub fn outcome_action(outcome: ReconcileOutcome) -> Action {
    match outcome {
        ReconcileOutcome::NoOp => Action::await_change(),
        ReconcileOutcome::RequeueNow => Action::requeue(Duration::ZERO),
        ReconcileOutcome::RequeueAfter(delay) => Action::requeue(delay),
    }
}

/// Reconcile entry point for `kube::runtime::Controller`
pub async fn reconcile(config: Arc<ClusterConfig>, ctx: Arc<Context>) -> Result<Action> {
    let key = ObjectKey::of(config.as_ref());
    let started = Instant::now();

    let result = ctx.reconciler.reconcile_key(&key).await;
    ctx.metrics.observe(&result, started.elapsed());

    let outcome = result?;
    ctx.backoffs.remove(&key);
    Ok(outcome_action(outcome))
}

/// Error policy for `kube::runtime::Controller`
pub fn error_policy(config: Arc<ClusterConfig>, err: &Error, ctx: Arc<Context>) -> Action {
    let key = ObjectKey::of(config.as_ref());
    match err.action() {
        ErrorAction::RequeueWithBackoff => {
            let delay = ctx.next_backoff(&key);
            warn!(config = %key, error = %err, retry_in = ?delay, "Reconcile failed, will retry");
            Action::requeue(delay)
        }
        ErrorAction::RequeueAfter(delay) => {
            debug!(config = %key, error = %err, retry_in = ?delay, "Reconcile interrupted");
            Action::requeue(delay)
        }
        ErrorAction::NoRequeue => {
            error!(config = %key, error = %err, "Reconcile failed, waiting for a change");
            Action::await_change()
        }
    }
}

/// Watch ClusterConfigs and BareMetalHosts until a shutdown signal arrives
pub async fn run_controller(client: Client, ctx: Arc<Context>) {
    let configs: Api<ClusterConfig> = Api::all(client.clone());
    let hosts: Api<BareMetalHost> = Api::all(client);

    let controller = Controller::new(configs, watcher::Config::default());
    let snapshot = controller.store();

    info!("Starting ClusterConfig controller");
    controller
        .watches(hosts, watcher::Config::default(), move |host: BareMetalHost| {
            let resolved = (!is_tombstone(&host)).then_some(&host);
            configs_for_host(resolved, snapshot.state())
                .into_iter()
                .map(|key| ObjectRef::<ClusterConfig>::new(&key.name).within(&key.namespace))
                .collect::<Vec<_>>()
        })
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((obj, _)) => debug!(config = %obj, "Reconciled"),
                Err(e) => debug!(error = %e, "Reconcile error reported to the controller"),
            }
        })
        .await;
    info!("ClusterConfig controller stopped");
}
