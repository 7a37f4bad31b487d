//! Availability Gate
//!
//! Pre-flight check that the API is reachable and the account behind the
//! credentials can be read. Nothing is provisioned unless this passes.

use crate::alert::{AlertStatus, Alerter};
use crate::api::{ResourceClient, ResourcePath};
use crate::context::AccountContext;
use reqwest::{Method, StatusCode};
use std::path::PathBuf;

/// Resource read to identify the account owning the credentials
pub const ACCOUNT_PATH: &str = "iam/Accounts";

/// Why the gate failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unavailable {
    /// The request never completed (connection, TLS, credentials)
    Unreachable(String),
    /// The API answered with something other than 200
    Status(u16),
}

impl std::fmt::Display for Unavailable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unreachable(reason) => write!(f, "API unreachable: {}", reason),
            Self::Status(code) => write!(f, "account read returned status {}", code),
        }
    }
}

/// Terminal state of the gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateVerdict {
    /// Carries the account name reported by the API, when present
    Pass(Option<String>),
    Fail {
        reason: Unavailable,
        alert: AlertStatus,
    },
}

impl GateVerdict {
    pub fn passed(&self) -> bool {
        matches!(self, Self::Pass(_))
    }
}

/// Read the account once and classify the result
pub async fn read_account(client: &ResourceClient) -> Result<Option<String>, Unavailable> {
    let path = ResourcePath::new(ACCOUNT_PATH);
    let response = client
        .exchange(Method::GET, &path.collection(), None)
        .await
        .map_err(|e| Unavailable::Unreachable(format!("{:#}", e)))?;

    if response.status != StatusCode::OK {
        return Err(Unavailable::Status(response.status.as_u16()));
    }

    // The name is informational; an odd payload does not fail the gate.
    let name = response.json().ok().and_then(|body| {
        body.get("Results")
            .and_then(|r| r.get(0))
            .and_then(|a| a.get("Name"))
            .and_then(|n| n.as_str())
            .map(|s| s.to_string())
    });
    Ok(name)
}

/// Run the availability check; on failure send the alert before returning.
///
/// The caller must stop the run when the verdict is not [`GateVerdict::Pass`].
pub async fn check(
    client: &ResourceClient,
    alerter: &Alerter,
    context: &AccountContext,
    attachments: &[PathBuf],
) -> GateVerdict {
    tracing::info!("Running the API and account availability test");

    match read_account(client).await {
        Ok(name) => {
            tracing::info!("The API and account availability test has passed");
            match &name {
                Some(found) => tracing::info!("The account named '{}' has been found", found),
                None => tracing::warn!("The account read succeeded but reported no account name"),
            }
            GateVerdict::Pass(name)
        }
        Err(reason) => {
            tracing::error!("The API and account availability test did not pass: {}", reason);
            let alert = alerter.notify_unavailable(context, attachments).await;
            tracing::error!("Exiting due to the account being unavailable");
            GateVerdict::Fail { reason, alert }
        }
    }
}
