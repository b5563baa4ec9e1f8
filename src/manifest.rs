use chrono::{DateTime, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One package as stored in the depot: identity, descriptive metadata, and
/// every released version keyed by semver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub category: String,
    pub name: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub versions: BTreeMap<Version, VersionData>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub maintainer: Option<String>,
    #[serde(default)]
    pub licenses: Vec<String>,
    #[serde(default)]
    pub upstream_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionData {
    pub published: DateTime<Utc>,
    #[serde(default)]
    pub download_size: Option<u64>,
    /// Dependency short names (`category/name`) mapped to version requirements.
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
}

impl Manifest {
    /// `category/name`, the unique identifier within the depot.
    pub fn short_name(&self) -> String {
        format!("{}/{}", self.category, self.name)
    }

    /// Versions newest first.
    pub fn sorted_versions(&self) -> Vec<(&Version, &VersionData)> {
        let mut versions: Vec<_> = self.versions.iter().collect();
        versions.sort_by(|a, b| b.0.cmp(a.0));
        versions
    }

    /// The most recently released version, if any.
    pub fn latest_version(&self) -> Option<&Version> {
        self.versions.keys().max()
    }
}
