//! Saved request collections
//!
//! A `studio.yml` file holds named requests that `studio run` forwards
//! through the relay in order.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use studio_shared::ProxyRequestDescriptor;

/// Root of a collection file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    /// Relay endpoint override for this collection
    pub proxy: Option<String>,

    #[serde(default)]
    pub requests: Vec<SavedRequest>,
}

/// One named request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedRequest {
    pub name: String,

    #[serde(default = "default_method")]
    pub method: String,

    pub url: String,

    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    pub data: Option<Value>,
}

fn default_method() -> String {
    "GET".to_string()
}

impl SavedRequest {
    pub fn descriptor(&self) -> ProxyRequestDescriptor {
        ProxyRequestDescriptor {
            method: self.method.clone(),
            url: self.url.clone(),
            headers: self.headers.clone(),
            data: self.data.clone(),
        }
    }
}

impl Collection {
    /// Load a collection from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read collection file: {}", path.display()))?;

        let collection: Collection = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse collection file: {}", path.display()))?;

        collection.validate()?;
        Ok(collection)
    }

    /// Validate the collection
    fn validate(&self) -> Result<()> {
        if self.requests.is_empty() {
            anyhow::bail!("No requests defined in collection");
        }

        let mut seen = HashSet::new();
        for req in &self.requests {
            if req.name.trim().is_empty() {
                anyhow::bail!("Request name cannot be empty");
            }
            if !seen.insert(req.name.as_str()) {
                anyhow::bail!("Duplicate request name '{}'", req.name);
            }
            if req.url.trim().is_empty() {
                anyhow::bail!("Request '{}' has no url", req.name);
            }
        }

        Ok(())
    }

    /// Requests matching `names`, in file order; all when `names` is empty
    pub fn select(&self, names: &[String]) -> Result<Vec<&SavedRequest>> {
        if names.is_empty() {
            return Ok(self.requests.iter().collect());
        }
        for name in names {
            if !self.requests.iter().any(|r| &r.name == name) {
                anyhow::bail!("No request named '{}' in collection", name);
            }
        }
        Ok(self.requests.iter().filter(|r| names.contains(&r.name)).collect())
    }

    /// Search for collection file in standard locations
    pub fn find_config() -> Option<PathBuf> {
        let candidates = ["studio.yml", "studio.yaml", ".studio.yml", ".studio.yaml"];

        // Check current directory
        for name in &candidates {
            let path = PathBuf::from(name);
            if path.exists() {
                return Some(path);
            }
        }

        // Check home directory
        if let Some(home) = dirs::home_dir() {
            for name in &candidates {
                let path = home.join(name);
                if path.exists() {
                    return Some(path);
                }
            }
        }

        None
    }
}
