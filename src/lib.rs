pub mod config;
pub mod manifest;
#[cfg(feature = "web")]
pub mod web;

use chrono::{DateTime, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::debug;

pub use config::{Link, RegistryConfig};
pub use manifest::{Manifest, Metadata, VersionData};

/// In-memory snapshot of every manifest known to the depot.
///
/// The index is immutable once built; callers that need reloads keep it
/// behind a lock and swap whole snapshots.
#[derive(Debug, Default, Clone)]
pub struct PackageIndex {
    manifests: Vec<Manifest>,
}

impl PackageIndex {
    pub fn from_manifests(mut manifests: Vec<Manifest>) -> Self {
        manifests.sort_by(|a, b| {
            a.category
                .cmp(&b.category)
                .then_with(|| a.name.cmp(&b.name))
        });
        Self { manifests }
    }

    /// Reads every `*.json` manifest under `dir`. Non-manifest files are
    /// skipped; a manifest that fails to parse aborts the load.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let dir = dir.as_ref();
        let entries = fs::read_dir(dir).map_err(|source| CatalogError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut manifests = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| CatalogError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let file = File::open(&path).map_err(|source| CatalogError::Io {
                path: path.clone(),
                source,
            })?;
            let manifest: Manifest = serde_json::from_reader(BufReader::new(file))
                .map_err(|source| CatalogError::Parse {
                    path: path.clone(),
                    source,
                })?;
            debug!(path = %path.display(), package = %manifest.short_name(), "Loaded manifest");
            manifests.push(manifest);
        }
        Ok(Self::from_manifests(manifests))
    }

    pub fn manifests(&self) -> impl Iterator<Item = &Manifest> {
        self.manifests.iter()
    }

    pub fn manifests_count(&self) -> usize {
        self.manifests.len()
    }

    pub fn manifest_of(&self, category: &str, name: &str) -> Option<&Manifest> {
        self.manifests
            .iter()
            .find(|manifest| manifest.category == category && manifest.name == name)
    }

    pub fn version_of(
        &self,
        category: &str,
        name: &str,
        version: &Version,
    ) -> Option<(&Manifest, &VersionData)> {
        let manifest = self.manifest_of(category, name)?;
        let data = manifest.versions.get(version)?;
        Some((manifest, data))
    }

    /// Matches `query` against the manifest field selected by `search_by`.
    ///
    /// Known fields are `name`, `category`, `description` and `tags`. Any
    /// other value is accepted but matches nothing, so an arbitrary
    /// `search_by` coming off a URL degrades to an empty result set.
    pub fn search(&self, query: &str, search_by: &str, exact: bool) -> Vec<&Manifest> {
        if query.is_empty() {
            return Vec::new();
        }
        self.manifests
            .iter()
            .filter(|manifest| {
                if exact {
                    match search_by {
                        "name" => manifest.name == query,
                        "category" => manifest.category == query,
                        "description" => manifest.metadata.description == query,
                        "tags" => manifest.metadata.tags.iter().any(|tag| tag == query),
                        _ => false,
                    }
                } else {
                    match search_by {
                        "name" => manifest.name.contains(query),
                        "category" => manifest.category.contains(query),
                        "description" => manifest.metadata.description.contains(query),
                        "tags" => manifest
                            .metadata
                            .tags
                            .iter()
                            .any(|tag| tag.contains(query)),
                        _ => false,
                    }
                }
            })
            .collect()
    }

    /// The most recent version publications across the whole depot, newest
    /// first. Feeds the home page history table.
    pub fn history(&self, limit: usize) -> Vec<HistoryEntry> {
        let mut rows: Vec<HistoryEntry> = self
            .manifests
            .iter()
            .flat_map(|manifest| {
                manifest.versions.iter().map(|(version, data)| HistoryEntry {
                    category: manifest.category.clone(),
                    name: manifest.name.clone(),
                    version: version.clone(),
                    published: data.published,
                })
            })
            .collect();
        rows.sort_by(|a, b| b.published.cmp(&a.published));
        rows.truncate(limit);
        rows
    }
}

/// One row of the home page "recently published" table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub category: String,
    pub name: String,
    pub version: Version,
    pub published: DateTime<Utc>,
}

/// The search fields the front end exposes in its dropdown, in display order.
pub const SEARCH_MODES: &[SearchMode] = &[
    SearchMode::Name,
    SearchMode::Category,
    SearchMode::Description,
    SearchMode::Tags,
];

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SearchMode {
    Name,
    Category,
    Description,
    Tags,
}

impl SearchMode {
    /// Lowercase identifier used in `search_by` query parameters and in the
    /// dropdown item class (`search-<slug>`).
    pub fn slug(&self) -> &'static str {
        match self {
            SearchMode::Name => "name",
            SearchMode::Category => "category",
            SearchMode::Description => "description",
            SearchMode::Tags => "tags",
        }
    }

    /// Human-facing dropdown label.
    pub fn label(&self) -> &'static str {
        match self {
            SearchMode::Name => "Name",
            SearchMode::Category => "Category",
            SearchMode::Description => "Description",
            SearchMode::Tags => "Tags",
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug)]
pub enum CatalogError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::Io { path, source } => {
                write!(f, "cannot read {}: {source}", path.display())
            }
            CatalogError::Parse { path, source } => {
                write!(f, "invalid manifest {}: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for CatalogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CatalogError::Io { source, .. } => Some(source),
            CatalogError::Parse { source, .. } => Some(source),
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::TimeZone;
    use std::collections::BTreeMap;

    pub fn manifest(
        category: &str,
        name: &str,
        description: &str,
        tags: &[&str],
        versions: &[(&str, i64)],
    ) -> Manifest {
        let versions = versions
            .iter()
            .map(|(version, ts)| {
                (
                    Version::parse(version).expect("fixture version"),
                    VersionData {
                        published: Utc.timestamp_opt(*ts, 0).single().expect("fixture ts"),
                        download_size: Some(1024),
                        dependencies: BTreeMap::new(),
                    },
                )
            })
            .collect();
        Manifest {
            category: category.to_string(),
            name: name.to_string(),
            metadata: Metadata {
                description: description.to_string(),
                tags: tags.iter().map(|tag| tag.to_string()).collect(),
                maintainer: Some("maintainers@example.com".to_string()),
                licenses: vec!["MIT".to_string()],
                upstream_url: Some("https://example.com".to_string()),
            },
            versions,
        }
    }

    pub fn sample_index() -> PackageIndex {
        PackageIndex::from_manifests(vec![
            manifest(
                "electronics",
                "widget",
                "A reusable widget",
                &["gui", "widget"],
                &[("1.0.0", 1_700_000_000), ("1.1.0", 1_700_600_000)],
            ),
            manifest(
                "sys-devel",
                "gcc",
                "The GNU compiler collection",
                &["compiler", "toolchain"],
                &[("13.2.0", 1_700_300_000)],
            ),
            manifest(
                "shell",
                "dash",
                "POSIX-compliant shell",
                &["shell", "posix"],
                &[("0.5.12", 1_699_000_000)],
            ),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::sample_index;
    use super::*;

    #[test]
    fn manifest_lookup_by_category_and_name() {
        let index = sample_index();
        let manifest = index.manifest_of("electronics", "widget").expect("found");
        assert_eq!(manifest.short_name(), "electronics/widget");
        assert!(index.manifest_of("electronics", "gizmo").is_none());
        assert!(index.manifest_of("virtual", "widget").is_none());
    }

    #[test]
    fn version_lookup_requires_released_version() {
        let index = sample_index();
        let version = Version::parse("1.0.0").unwrap();
        assert!(index.version_of("electronics", "widget", &version).is_some());
        let missing = Version::parse("9.9.9").unwrap();
        assert!(index.version_of("electronics", "widget", &missing).is_none());
    }

    #[test]
    fn search_by_each_known_field() {
        let index = sample_index();
        assert_eq!(index.search("widg", "name", false).len(), 1);
        assert_eq!(index.search("sys-devel", "category", false).len(), 1);
        assert_eq!(index.search("compiler", "description", false).len(), 1);
        assert_eq!(index.search("posix", "tags", false).len(), 1);
    }

    #[test]
    fn search_exact_match_rejects_substrings() {
        let index = sample_index();
        assert_eq!(index.search("widget", "name", true).len(), 1);
        assert!(index.search("widg", "name", true).is_empty());
    }

    #[test]
    fn unknown_search_field_matches_nothing() {
        let index = sample_index();
        assert!(index.search("widget", "maintainer", false).is_empty());
        assert!(index.search("widget", "", false).is_empty());
    }

    #[test]
    fn empty_query_matches_nothing() {
        let index = sample_index();
        assert!(index.search("", "name", false).is_empty());
    }

    #[test]
    fn history_is_newest_first_and_truncated() {
        let index = sample_index();
        let rows = index.history(3);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].name, "widget");
        assert_eq!(rows[0].version, Version::parse("1.1.0").unwrap());
        assert!(rows.windows(2).all(|w| w[0].published >= w[1].published));
    }

    #[test]
    fn load_dir_reads_json_manifests() {
        let dir = tempfile::tempdir().expect("temp dir");
        let manifest = fixtures::manifest(
            "shell",
            "dash",
            "POSIX-compliant shell",
            &["shell"],
            &[("0.5.12", 1_699_000_000)],
        );
        let path = dir.path().join("shell-dash.json");
        std::fs::write(&path, serde_json::to_vec(&manifest).unwrap()).unwrap();
        std::fs::write(dir.path().join("README.md"), "not a manifest").unwrap();

        let index = PackageIndex::load_dir(dir.path()).expect("load");
        assert_eq!(index.manifests_count(), 1);
        assert!(index.manifest_of("shell", "dash").is_some());
    }

    #[test]
    fn load_dir_reports_broken_manifest() {
        let dir = tempfile::tempdir().expect("temp dir");
        std::fs::write(dir.path().join("broken.json"), b"{").unwrap();
        let err = PackageIndex::load_dir(dir.path()).expect_err("must fail");
        assert!(err.to_string().contains("invalid manifest"));
    }
}
