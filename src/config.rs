//! Repository configuration, persisted as TOML.
//!
//! ```toml
//! data_dir = "/var/lib/ontograph"
//! cache_ttl_secs = 54000
//!
//! [[documents]]
//! iri = "http://example.org/people"
//! file = "people.toml"
//!
//! [intents.concepts]
//! person = "http://example.org#Person"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::ontology::catalog::DEFAULT_MAX_DEPENDENT_PROPERTIES;
use crate::ontology::hierarchy::DEFAULT_MAX_DEPTH;

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// An ontology document imported at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSource {
    /// IRI the document is registered under.
    pub iri: String,
    /// Path to the TOML or JSON document. Relative paths resolve against the
    /// config file's directory.
    pub file: PathBuf,
}

/// Intent to IRI pins that win over intents declared in the ontology.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntentOverrides {
    pub concepts: BTreeMap<String, String>,
    pub relationships: BTreeMap<String, String>,
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Data directory for persistence. `None` for memory-only mode.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// Time-to-live of every cached ontology view.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Upper bound on dependent properties per property.
    #[serde(default = "default_max_dependent_properties")]
    pub max_dependent_properties: usize,
    /// Depth limit for hierarchy walks.
    #[serde(default = "default_max_hierarchy_depth")]
    pub max_hierarchy_depth: usize,
    /// Visibility stamped on every element the repository creates.
    #[serde(default)]
    pub visibility: String,
    #[serde(default)]
    pub documents: Vec<DocumentSource>,
    #[serde(default)]
    pub intents: IntentOverrides,
}

fn default_cache_ttl_secs() -> u64 {
    15 * 60 * 60
}
fn default_max_dependent_properties() -> usize {
    DEFAULT_MAX_DEPENDENT_PROPERTIES
}
fn default_max_hierarchy_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            cache_ttl_secs: default_cache_ttl_secs(),
            max_dependent_properties: default_max_dependent_properties(),
            max_hierarchy_depth: default_max_hierarchy_depth(),
            visibility: String::new(),
            documents: Vec::new(),
            intents: IntentOverrides::default(),
        }
    }
}

impl RepositoryConfig {
    /// Memory-only config with defaults.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Durable config rooted at `dir`.
    pub fn with_data_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: Some(dir.into()),
            ..Self::default()
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Load from a TOML file. Relative document paths are made absolute
    /// against the file's directory.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let mut config = Self::from_toml_str(&text, &path.display().to_string())?;
        if let Some(dir) = path.parent() {
            for doc in &mut config.documents {
                if doc.file.is_relative() {
                    doc.file = dir.join(&doc.file);
                }
            }
        }
        Ok(config)
    }

    pub fn from_toml_str(text: &str, origin: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: origin.to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.cache_ttl_secs == 0 {
            return Err(ConfigError::Invalid {
                message: "cache_ttl_secs must be > 0".into(),
            });
        }
        if self.max_hierarchy_depth == 0 {
            return Err(ConfigError::Invalid {
                message: "max_hierarchy_depth must be > 0".into(),
            });
        }
        let mut seen = std::collections::HashSet::new();
        for doc in &self.documents {
            if !seen.insert(doc.iri.as_str()) {
                return Err(ConfigError::Invalid {
                    message: format!("document \"{}\" is listed twice", doc.iri),
                });
            }
        }
        Ok(())
    }

    pub fn to_toml(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid {
            message: format!("failed to serialize config: {e}"),
        })
    }
}
