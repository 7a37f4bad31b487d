//! Desired policy set and its provisioning
//!
//! - [`catalog`] - policy specs: embedded default set and policy files
//! - [`provisioner`] - best-effort batch creation through the resource client

mod catalog;
mod provisioner;

pub use catalog::{default_policies, load_policies, parse_policies, PolicyFile, PolicySpec};
pub use provisioner::{indexed_label, ProvisionReport, Provisioner};
