//! Policy Provisioner
//!
//! Submits every policy spec once through the resource client. Individual
//! failures are logged and do not stop the batch; nothing is rolled back.

use super::catalog::PolicySpec;
use crate::api::{Outcome, ResourceClient};
use futures::stream::{self, StreamExt};

/// Per-spec results of one apply run, in spec order
#[derive(Debug, Clone, Default)]
pub struct ProvisionReport {
    pub results: Vec<(String, Outcome)>,
}

impl ProvisionReport {
    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|(_, o)| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.succeeded()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed() == 0
    }

    /// Labels of specs that need a manual retry
    pub fn failures(&self) -> impl Iterator<Item = &str> {
        self.results
            .iter()
            .filter(|(_, o)| !o.is_success())
            .map(|(label, _)| label.as_str())
    }
}

pub struct Provisioner<'a> {
    client: &'a ResourceClient,
}

impl<'a> Provisioner<'a> {
    pub fn new(client: &'a ResourceClient) -> Self {
        Self { client }
    }

    /// `index` is the spec's position in the batch; it keeps labels of
    /// unnamed specs on the same path apart.
    async fn submit(&self, index: usize, spec: &PolicySpec) -> (String, Outcome) {
        let label = indexed_label(index, spec);
        tracing::info!("Creating policy {}", label);
        let outcome = self.client.create(&spec.path, &spec.body).await;
        tracing::info!("Policy {}: {}", label, outcome);
        (label, outcome)
    }

    /// Create each spec in order, one at a time
    pub async fn apply(&self, specs: &[PolicySpec]) -> ProvisionReport {
        let mut report = ProvisionReport::default();
        for (index, spec) in specs.iter().enumerate() {
            report.results.push(self.submit(index, spec).await);
        }
        log_summary(&report);
        report
    }

    /// Create specs with up to `limit` requests in flight. The report keeps
    /// spec order; only the log interleaving differs from [`apply`](Self::apply).
    pub async fn apply_concurrent(&self, specs: &[PolicySpec], limit: usize) -> ProvisionReport {
        if limit <= 1 {
            return self.apply(specs).await;
        }

        let results = stream::iter(specs.iter().enumerate())
            .map(|(index, spec)| self.submit(index, spec))
            .buffered(limit)
            .collect::<Vec<_>>()
            .await;

        let report = ProvisionReport { results };
        log_summary(&report);
        report
    }
}

/// One-based position plus the spec label, e.g. `#2 sample-sys-config-policy (hyperflex/SysConfigPolicies)`
pub fn indexed_label(index: usize, spec: &PolicySpec) -> String {
    format!("#{} {}", index + 1, spec.label())
}

fn log_summary(report: &ProvisionReport) {
    if report.all_succeeded() {
        tracing::info!("All {} policies were submitted successfully", report.total());
    } else {
        tracing::warn!(
            "{} of {} policies failed and need a manual retry: {}",
            report.failed(),
            report.total(),
            report.failures().collect::<Vec<_>>().join(", ")
        );
    }
}
