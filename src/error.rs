//! Rich diagnostic error types for the ontology repository.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains. Every variant carries
//! the offending IRI or value so callers upstream can build their own messages.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the crate.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text) through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum OntoError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Ontology(#[from] OntologyError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Import(#[from] ImportError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("I/O error: {source}")]
    #[diagnostic(
        code(onto::store::io),
        help(
            "A filesystem operation failed. Check that the data directory exists, \
             has correct permissions, and that the disk is not full."
        )
    )]
    Io {
        #[source]
        source: std::io::Error,
    },

    #[error("redb transaction error: {message}")]
    #[diagnostic(
        code(onto::store::redb),
        help(
            "The embedded database encountered a transaction error. \
             The data directory may be corrupt or held open by another process."
        )
    )]
    Redb { message: String },

    #[error("serialization error: {message}")]
    #[diagnostic(
        code(onto::store::serde),
        help(
            "Failed to encode or decode a stored graph element. \
             The on-disk format may come from an incompatible version; \
             re-import the ontology into a fresh data directory."
        )
    )]
    Serialization { message: String },
}

// ---------------------------------------------------------------------------
// Graph errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    #[error("vertex not found: \"{id}\"")]
    #[diagnostic(
        code(onto::graph::vertex_not_found),
        help("Create the vertex before attaching properties or edges to it.")
    )]
    VertexNotFound { id: String },

    #[error("edge \"{id}\" already exists between different endpoints ({existing_out} -> {existing_in})")]
    #[diagnostic(
        code(onto::graph::edge_conflict),
        help(
            "Edge ids are derived from their endpoints. Two different endpoint pairs \
             produced the same id, which means an IRI contains the '-' separator in an \
             ambiguous position."
        )
    )]
    EdgeConflict {
        id: String,
        existing_out: String,
        existing_in: String,
    },

    #[error("edge not found: \"{id}\"")]
    #[diagnostic(
        code(onto::graph::edge_not_found),
        help("The edge was deleted or never created.")
    )]
    EdgeNotFound { id: String },

    #[error("batch error: {message}")]
    #[diagnostic(
        code(onto::graph::batch),
        help("Batches cannot be nested; commit or abort the open batch first.")
    )]
    Batch { message: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),
}

// ---------------------------------------------------------------------------
// Ontology errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum OntologyError {
    #[error("unknown data type \"{iri}\"")]
    #[diagnostic(
        code(onto::ontology::unknown_data_type),
        help(
            "Only the fixed set of xsd and visallo datatypes can be mapped to a property type. \
             Change the property's range to a supported datatype."
        )
    )]
    UnknownDataType { iri: String },

    #[error("unexpected number of parents for \"{iri}\": found {count}")]
    #[diagnostic(
        code(onto::ontology::ambiguous_parent),
        help(
            "Concepts and relationships form single-parent trees. \
             Remove the extra is-a edges from the stored ontology."
        )
    )]
    AmbiguousParent { iri: String, count: usize },

    #[error("hierarchy walk from \"{iri}\" exceeded {max_depth} levels or revisited a node")]
    #[diagnostic(
        code(onto::ontology::hierarchy_too_deep),
        help(
            "The is-a hierarchy contains a cycle or is deeper than `max_hierarchy_depth`. \
             Fix the parent declarations in the imported ontology."
        )
    )]
    HierarchyTooDeep { iri: String, max_depth: usize },

    #[error("well-known concept \"{iri}\" is missing")]
    #[diagnostic(
        code(onto::ontology::missing_well_known),
        help("Open the repository through `OntologyRepository::open`, which creates the root and entity concepts.")
    )]
    MissingWellKnownConcept { iri: String },

    #[error(
        "properties with dependent properties must contain the same number of values. \
         \"{iri}\" expected {expected} found {actual}"
    )]
    #[diagnostic(
        code(onto::ontology::dependent_value_count),
        help("Supply exactly one value for each dependent property, in declaration order.")
    )]
    DependentValueCountMismatch {
        iri: String,
        expected: usize,
        actual: usize,
    },

    #[error("property \"{iri}\" must be attached to at least one concept or relationship")]
    #[diagnostic(
        code(onto::ontology::missing_owner),
        help("Pass a concept or relationship owner when adding a property.")
    )]
    MissingOwner { iri: String },

    #[error("{kind} not found: \"{iri}\"")]
    #[diagnostic(
        code(onto::ontology::not_found),
        help("Import or create the element before referring to it.")
    )]
    NotFound { kind: &'static str, iri: String },

    #[error("found {count} {kind} elements for intent \"{intent}\"")]
    #[diagnostic(
        code(onto::ontology::ambiguous_intent),
        help(
            "An intent must identify one element. Remove the intent from all but one element, \
             or pin it with an override in the `[intents]` config table."
        )
    )]
    AmbiguousIntent {
        kind: &'static str,
        intent: String,
        count: usize,
    },

    #[error("\"{iri}\" is not an extended data table property")]
    #[diagnostic(
        code(onto::ontology::invalid_table),
        help("Only properties of type extendedDataTable can own table columns.")
    )]
    InvalidTableProperty { iri: String },

    #[error("could not find domain \"{domain}\" for property \"{iri}\"")]
    #[diagnostic(
        code(onto::ontology::unknown_domain),
        help("Domains must name an existing concept or relationship.")
    )]
    UnknownDomain { iri: String, domain: String },

    #[error("property \"{iri}\" declares {count} dependent properties, more than the limit of {max}")]
    #[diagnostic(
        code(onto::ontology::too_many_dependents),
        help("Raise `max_dependent_properties` in the repository config.")
    )]
    TooManyDependentProperties { iri: String, count: usize, max: usize },

    #[error("cannot convert \"{value}\" for \"{iri}\" ({data_type}): {message}")]
    #[diagnostic(
        code(onto::ontology::invalid_value),
        help("Check the raw value against the property's data type.")
    )]
    InvalidValue {
        iri: String,
        data_type: String,
        value: String,
        message: String,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),
}

// ---------------------------------------------------------------------------
// Import errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ImportError {
    #[error("\"{iri}\" declares {count} super classes, at most one is allowed")]
    #[diagnostic(
        code(onto::import::multiple_super_classes),
        help("Concepts have a single parent. Keep one subClassOf declaration.")
    )]
    MultipleSuperClasses { iri: String, count: usize },

    #[error("data property \"{iri}\" declares {count} ranges, exactly one is required")]
    #[diagnostic(
        code(onto::import::invalid_range),
        help("Declare a single datatype range for every data property.")
    )]
    InvalidRange { iri: String, count: usize },

    #[error("glyph icon for \"{iri}\" not found at {path}")]
    #[diagnostic(
        code(onto::import::icon_not_found),
        help("Icon paths are resolved relative to the ontology document's directory.")
    )]
    IconNotFound {
        iri: String,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read ontology document: {path}")]
    #[diagnostic(
        code(onto::import::read),
        help("Ensure the document exists and is readable.")
    )]
    DocumentRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse ontology document {path}: {message}")]
    #[diagnostic(
        code(onto::import::parse),
        help("Documents are TOML or JSON object models with classes, dataProperties and objectProperties.")
    )]
    DocumentParse { path: String, message: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Ontology(#[from] OntologyError),
}

impl From<GraphError> for ImportError {
    fn from(err: GraphError) -> Self {
        ImportError::Ontology(OntologyError::Graph(err))
    }
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read repository config: {path}")]
    #[diagnostic(
        code(onto::config::read),
        help("Ensure the config file exists and is valid TOML.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse repository config {path}: {message}")]
    #[diagnostic(
        code(onto::config::parse),
        help("Check the TOML syntax in the config file.")
    )]
    Parse { path: String, message: String },

    #[error("invalid repository config: {message}")]
    #[diagnostic(code(onto::config::invalid))]
    Invalid { message: String },
}

/// Convenience result type for the crate.
pub type OntoResult<T> = std::result::Result<T, OntoError>;
