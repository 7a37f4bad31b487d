//! Policy catalog - load desired policy specs
//!
//! The default HyperFlex Edge policy set is embedded at compile time. A
//! user-supplied YAML or JSON file with the same shape can replace it.

use crate::api::ResourcePath;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::OnceLock;

/// Embedded default policy set (compiled into the binary)
const DEFAULT_POLICY_FILE: &str = include_str!("../policies/hyperflex_edge.json");

/// One desired provisioning action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicySpec {
    pub path: ResourcePath,
    pub body: Value,
}

impl PolicySpec {
    pub fn new(path: impl Into<ResourcePath>, body: Value) -> Self {
        Self {
            path: path.into(),
            body,
        }
    }

    /// Display label: the body's `Name` when present, else the path
    pub fn label(&self) -> String {
        match self.body.get("Name").and_then(|v| v.as_str()) {
            Some(name) => format!("{} ({})", name, self.path),
            None => self.path.to_string(),
        }
    }
}

/// Root structure of a policy file
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PolicyFile {
    #[serde(default)]
    pub policies: Vec<PolicySpec>,
}

static DEFAULT_POLICIES: OnceLock<Vec<PolicySpec>> = OnceLock::new();

/// The embedded HyperFlex Edge policy set, in submission order
pub fn default_policies() -> &'static [PolicySpec] {
    DEFAULT_POLICIES.get_or_init(|| {
        let file: PolicyFile = serde_json::from_str(DEFAULT_POLICY_FILE)
            .unwrap_or_else(|e| panic!("Failed to parse embedded policy JSON: {}", e));
        file.policies
    })
}

/// Parse a policy file. JSON is used for `.json` files, YAML otherwise
/// (YAML being a superset, either works for other extensions too).
pub fn parse_policies(content: &str, is_json: bool) -> Result<Vec<PolicySpec>> {
    let file: PolicyFile = if is_json {
        serde_json::from_str(content).context("Failed to parse policy JSON")?
    } else {
        serde_yaml::from_str(content).context("Failed to parse policy YAML")?
    };
    Ok(file.policies)
}

/// Load a policy set from disk
pub fn load_policies(path: &Path) -> Result<Vec<PolicySpec>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read policy file {:?}", path))?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let policies = parse_policies(&content, is_json)
        .with_context(|| format!("Invalid policy file {:?}", path))?;
    tracing::info!("Loaded {} policies from {:?}", policies.len(), path);
    Ok(policies)
}
