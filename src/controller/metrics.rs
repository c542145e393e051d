//! Controller Metrics
//!
//! Prometheus counters for the reconcile loop:
//!
//! - `cluster_relocation_reconciliations_total{result}` - reconciles by outcome
//! - `cluster_relocation_reconcile_errors_total{kind}` - failed reconciles by error kind
//! - `cluster_relocation_reconcile_duration_seconds` - reconcile latency

use crate::domain::ports::ReconcileOutcome;
use crate::error::{Error, Result};
use prometheus::{Histogram, HistogramOpts, IntCounterVec, Opts, Registry};
use std::time::Duration;

/// Reconcile loop metrics
#[derive(Clone)]
pub struct ControllerMetrics {
    reconciliations: IntCounterVec,
    errors: IntCounterVec,
    duration: Histogram,
}

impl ControllerMetrics {
    /// Create the metrics and register them with `registry`
    pub fn register(registry: &Registry) -> Result<Self> {
        let reconciliations = IntCounterVec::new(
            Opts::new(
                "cluster_relocation_reconciliations_total",
                "Total number of ClusterConfig reconciliations by result",
            ),
            &["result"],
        )
        .map_err(metric_error)?;

        let errors = IntCounterVec::new(
            Opts::new(
                "cluster_relocation_reconcile_errors_total",
                "Total number of failed ClusterConfig reconciliations by error kind",
            ),
            &["kind"],
        )
        .map_err(metric_error)?;

        let duration = Histogram::with_opts(
            HistogramOpts::new(
                "cluster_relocation_reconcile_duration_seconds",
                "Duration of ClusterConfig reconciliations in seconds",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0]),
        )
        .map_err(metric_error)?;

        registry
            .register(Box::new(reconciliations.clone()))
            .map_err(metric_error)?;
        registry.register(Box::new(errors.clone())).map_err(metric_error)?;
        registry.register(Box::new(duration.clone())).map_err(metric_error)?;

        Ok(Self {
            reconciliations,
            errors,
            duration,
        })
    }

    /// Record a finished reconcile
    pub fn observe(&self, result: &Result<ReconcileOutcome>, elapsed: Duration) {
        self.duration.observe(elapsed.as_secs_f64());

        let label = match result {
            Ok(ReconcileOutcome::NoOp) => "success",
            Ok(_) => "requeue",
            Err(err) => {
                self.errors.with_label_values(&[err.metric_label()]).inc();
                "error"
            }
        };
        self.reconciliations.with_label_values(&[label]).inc();
    }

    /// Count of reconciles recorded with `result`
    pub fn reconciliations(&self, result: &str) -> u64 {
        self.reconciliations.with_label_values(&[result]).get()
    }
}

fn metric_error(err: prometheus::Error) -> Error {
    Error::Internal(format!("metrics registration failed: {}", err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observe_by_result() {
        let registry = Registry::new();
        let metrics = ControllerMetrics::register(&registry).unwrap();

        metrics.observe(&Ok(ReconcileOutcome::NoOp), Duration::from_millis(5));
        metrics.observe(
            &Ok(ReconcileOutcome::RequeueAfter(Duration::from_secs(5))),
            Duration::from_millis(5),
        );
        metrics.observe(
            &Err(Error::Internal("boom".into())),
            Duration::from_millis(5),
        );

        assert_eq!(metrics.reconciliations("success"), 1);
        assert_eq!(metrics.reconciliations("requeue"), 1);
        assert_eq!(metrics.reconciliations("error"), 1);
        assert!(!registry.gather().is_empty());
    }

    #[test]
    fn test_double_registration_fails() {
        let registry = Registry::new();
        ControllerMetrics::register(&registry).unwrap();
        assert!(ControllerMetrics::register(&registry).is_err());
    }
}
