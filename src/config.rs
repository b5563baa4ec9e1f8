use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_PATH: &str = "./Depot.toml";

/// Depot-wide settings rendered into every page: the registry identity and
/// the navigation links shown next to the searchbar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    pub name: String,
    pub pretty_name: String,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(default = "default_packages_dir")]
    pub packages_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub active: bool,
}

fn default_packages_dir() -> PathBuf {
    PathBuf::from("./packages")
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            name: "depot".to_string(),
            pretty_name: "Depot".to_string(),
            links: Vec::new(),
            packages_dir: default_packages_dir(),
        }
    }
}

impl RegistryConfig {
    /// Loads `./Depot.toml`, falling back to defaults when the file is absent.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Path::new(DEFAULT_CONFIG_PATH);
        if path.exists() {
            Self::load_from(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(config)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "cannot read {}: {source}", path.display())
            }
            ConfigError::Parse { path, source } => {
                write!(f, "cannot parse {}: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_full_config() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"
name = "stable"
pretty_name = "Stable Depot"
packages_dir = "/var/lib/depot/packages"

[[links]]
name = "Docs"
url = "https://example.com/docs"

[[links]]
name = "Browse"
url = "/"
active = true
"#
        )
        .expect("write config");

        let config = RegistryConfig::load_from(file.path()).expect("load config");
        assert_eq!(config.name, "stable");
        assert_eq!(config.pretty_name, "Stable Depot");
        assert_eq!(config.links.len(), 2);
        assert!(!config.links[0].active);
        assert!(config.links[1].active);
        assert_eq!(config.packages_dir, PathBuf::from("/var/lib/depot/packages"));
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, "name = \"tiny\"\npretty_name = \"Tiny\"\n").expect("write config");

        let config = RegistryConfig::load_from(file.path()).expect("load config");
        assert!(config.links.is_empty());
        assert_eq!(config.packages_dir, PathBuf::from("./packages"));
    }

    #[test]
    fn invalid_toml_is_reported_with_path() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, "name = [broken").expect("write config");

        let err = RegistryConfig::load_from(file.path()).expect_err("must fail");
        assert!(err.to_string().contains("cannot parse"));
    }
}
