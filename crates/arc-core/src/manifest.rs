//! Resource manifest: the ordered, versioned list loaded at boot.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::capability::MinVersions;
use crate::types::{ArcError, ArcResult, Version};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: Version,
    /// Resource paths, loaded and injected in this order.
    pub resources: Vec<String>,
    /// Browser floor for the capability gate; defaults apply when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_versions: Option<MinVersions>,
}

impl Manifest {
    pub fn new(version: Version, resources: Vec<String>) -> Self {
        Self {
            version,
            resources,
            min_versions: None,
        }
    }

    pub fn from_json(json: &str) -> ArcResult<Self> {
        serde_json::from_str(json).map_err(|e| ArcError::InvalidManifest(e.to_string()))
    }

    pub fn from_path(path: &Path) -> ArcResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ArcError::InvalidManifest(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::from_json(&raw)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}
