//! Gated provisioning run
//!
//! Ties the availability gate to the provisioner: the gate runs once, and
//! policies are only submitted when it passes.

use crate::alert::Alerter;
use crate::api::ResourceClient;
use crate::context::AccountContext;
use crate::gate::{self, GateVerdict};
use crate::policy::{PolicySpec, ProvisionReport, Provisioner};
use std::path::PathBuf;

/// How a run ended, mapped to the process exit code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Gate passed and every policy was accepted
    Completed,
    /// The availability gate failed; nothing was submitted
    GateFailed,
    /// Gate passed but at least one policy failed
    PartialFailure,
}

impl RunStatus {
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Completed => 0,
            Self::GateFailed => 2,
            Self::PartialFailure => 3,
        }
    }
}

/// Everything one run needs, supplied by the caller
pub struct Run<'a> {
    pub client: &'a ResourceClient,
    pub alerter: &'a Alerter,
    pub context: &'a AccountContext,
    pub attachments: &'a [PathBuf],
}

impl Run<'_> {
    /// Availability gate only
    pub async fn check(&self) -> GateVerdict {
        gate::check(self.client, self.alerter, self.context, self.attachments).await
    }

    /// Gate, then submit every spec once. The report is `None` when the gate
    /// failed.
    pub async fn provision(
        &self,
        specs: &[PolicySpec],
        concurrency: usize,
    ) -> (RunStatus, Option<ProvisionReport>) {
        if !self.check().await.passed() {
            return (RunStatus::GateFailed, None);
        }

        tracing::info!("Submitting {} policies", specs.len());
        let report = Provisioner::new(self.client)
            .apply_concurrent(specs, concurrency)
            .await;

        let status = if report.all_succeeded() {
            RunStatus::Completed
        } else {
            RunStatus::PartialFailure
        };
        (status, Some(report))
    }
}
