//! Account context
//!
//! Descriptive facts about the service account this run acts for. Only used
//! to make alerts readable.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountContext {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub cluster: String,
    #[serde(default)]
    pub service_type: String,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub location: String,
}

impl AccountContext {
    /// Label/value pairs in the order they appear in alerts
    pub fn summary(&self) -> [(&'static str, &str); 6] {
        [
            ("Service Account Type", &self.service_type),
            ("Name", &self.name),
            ("Email", &self.email),
            ("Associated Cluster", &self.cluster),
            ("Session ID", &self.session_id),
            ("Location", &self.location),
        ]
    }
}
