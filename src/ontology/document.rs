//! Pre-parsed ontology documents.
//!
//! An [`OntologyDocument`] is the object model an external OWL parser would
//! produce: ordered declarations, each carrying IRI-keyed annotations. It is
//! read from TOML or JSON so documents can be authored by hand:
//!
//! ```toml
//! [[classes]]
//! iri = "http://example.org#Person"
//! annotations = [
//!   { property = "http://www.w3.org/2000/01/rdf-schema#label", value = "Person", lang = "en" },
//!   { property = "http://visallo.org#intent", value = "person" },
//! ]
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ImportError;

/// Annotation IRIs consumed only at import time.
pub mod vocab {
    pub const RDFS_LABEL: &str = "http://www.w3.org/2000/01/rdf-schema#label";
    pub const OBJECT_PROPERTY_DOMAIN: &str = "http://visallo.org#objectPropertyDomain";
    pub const EXTENDED_DATA_TABLE_DOMAIN: &str = "http://visallo.org#extendedDataTableDomain";
    pub const DEPENDENT_PROPERTY_IRI: &str = "http://visallo.org#dependentPropertyIri";
}

// ── Document model ──────────────────────────────────────────────────────

/// One annotation value, optionally language tagged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub property: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
}

impl Annotation {
    pub fn new(property: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            value: value.into(),
            lang: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationPropertyDecl {
    pub iri: String,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassDecl {
    pub iri: String,
    #[serde(default)]
    pub super_classes: Vec<String>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPropertyDecl {
    pub iri: String,
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default)]
    pub ranges: Vec<String>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectPropertyDecl {
    pub iri: String,
    #[serde(default)]
    pub super_properties: Vec<String>,
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default)]
    pub ranges: Vec<String>,
    #[serde(default)]
    pub inverse_of: Vec<String>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

/// Parsed ontology document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OntologyDocument {
    pub annotation_properties: Vec<AnnotationPropertyDecl>,
    pub classes: Vec<ClassDecl>,
    pub data_properties: Vec<DataPropertyDecl>,
    pub object_properties: Vec<ObjectPropertyDecl>,
    /// Directory icon file names are resolved against.
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

/// Read access to a declaration's annotations.
pub trait Annotated {
    fn iri(&self) -> &str;

    fn annotations(&self) -> &[Annotation];

    /// Every value of `property`, in declaration order.
    fn values(&self, property: &str) -> Vec<&str> {
        self.annotations()
            .iter()
            .filter(|a| a.property == property)
            .map(|a| a.value.as_str())
            .collect()
    }

    fn first(&self, property: &str) -> Option<&str> {
        self.annotations()
            .iter()
            .find(|a| a.property == property)
            .map(|a| a.value.as_str())
    }

    /// The `rdfs:label`, preferring English or untagged values.
    fn label(&self) -> Option<&str> {
        let labels: Vec<&Annotation> = self
            .annotations()
            .iter()
            .filter(|a| a.property == vocab::RDFS_LABEL)
            .collect();
        labels
            .iter()
            .copied()
            .find(|a| matches!(a.lang.as_deref(), None | Some("en")))
            .or_else(|| labels.first().copied())
            .map(|a| a.value.as_str())
    }
}

macro_rules! annotated {
    ($($ty:ty),*) => {
        $(impl Annotated for $ty {
            fn iri(&self) -> &str {
                &self.iri
            }

            fn annotations(&self) -> &[Annotation] {
                &self.annotations
            }
        })*
    };
}

annotated!(AnnotationPropertyDecl, ClassDecl, DataPropertyDecl, ObjectPropertyDecl);

// ── Loading ─────────────────────────────────────────────────────────────

impl OntologyDocument {
    pub fn from_toml_str(text: &str, origin: &str) -> Result<Self, ImportError> {
        toml::from_str(text).map_err(|e| ImportError::DocumentParse {
            path: origin.to_string(),
            message: e.to_string(),
        })
    }

    pub fn from_json_str(text: &str, origin: &str) -> Result<Self, ImportError> {
        serde_json::from_str(text).map_err(|e| ImportError::DocumentParse {
            path: origin.to_string(),
            message: e.to_string(),
        })
    }

    /// Load a `.json` or TOML document. Icon paths resolve against its directory.
    pub fn load(path: &Path) -> Result<Self, ImportError> {
        let origin = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|source| ImportError::DocumentRead {
            path: origin.clone(),
            source,
        })?;
        let mut doc = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&text, &origin)?,
            _ => Self::from_toml_str(&text, &origin)?,
        };
        doc.base_dir = path.parent().map(Path::to_path_buf);
        Ok(doc)
    }

    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    /// Content digest over the canonical JSON form.
    ///
    /// Formatting differences in the source file do not change it.
    pub fn digest(&self) -> String {
        // Serializing plain strings and vectors cannot fail.
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        blake3::hash(&canonical).to_hex().to_string()
    }

    pub fn class(&self, iri: &str) -> Option<&ClassDecl> {
        self.classes.iter().find(|c| c.iri == iri)
    }

    pub fn object_property(&self, iri: &str) -> Option<&ObjectPropertyDecl> {
        self.object_properties.iter().find(|p| p.iri == iri)
    }

    pub fn is_empty(&self) -> bool {
        self.annotation_properties.is_empty()
            && self.classes.is_empty()
            && self.data_properties.is_empty()
            && self.object_properties.is_empty()
    }
}
