//! Idempotent import of parsed ontology documents.
//!
//! A document is imported inside one graph batch: either every element it
//! declares is materialized and its digest recorded, or the batch is rolled
//! back and the graph is left as it was. Phases run in a fixed order so that
//! later declarations can refer to earlier ones:
//!
//! 1. annotation properties
//! 2. classes, parents before children
//! 3. data properties, tables before their columns, then dependents
//! 4. object properties, parents before children
//! 5. inverse-of pairs
//!
//! Re-importing an element keeps its vertex and structural edges but strips
//! and reapplies its changeable attributes. Malformed optional annotation
//! values are logged and skipped; structural problems fail the document.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::error::{ImportError, OntologyError};
use crate::graph::{PropertyDefinition, ValueKind};

use super::catalog::NewProperty;
use super::codec::{ElementKind, attr};
use super::document::{
    Annotated, ClassDecl, DataPropertyDecl, ObjectPropertyDecl, OntologyDocument, vocab,
};
use super::types::TypeResolver;
use super::writer::{OntologyWriter, stored_digest};
use super::{ENTITY_CONCEPT_IRI, PropertyType, ROOT_CONCEPT_IRI, TOP_OBJECT_PROPERTY_IRI};

/// Outcome of importing one document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportReport {
    pub document_iri: String,
    /// The stored digest matched; nothing was written.
    pub skipped: bool,
    pub annotation_properties: usize,
    pub concepts: usize,
    pub properties: usize,
    pub relationships: usize,
    pub inverses: usize,
    pub elapsed: Duration,
}

/// Imports documents through a held writer.
pub struct OntologyImporter<'w, 'a> {
    writer: &'w OntologyWriter<'a>,
}

impl<'w, 'a> OntologyImporter<'w, 'a> {
    pub fn new(writer: &'w OntologyWriter<'a>) -> Self {
        Self { writer }
    }

    /// Import `doc` under `document_iri`, skipping it if unchanged.
    pub fn import(&self, document_iri: &str, doc: &OntologyDocument) -> Result<ImportReport, ImportError> {
        let started = Instant::now();
        let graph = self.writer.graph();
        let digest = doc.digest();
        let mut report = ImportReport {
            document_iri: document_iri.to_string(),
            ..Default::default()
        };

        let stored = stored_digest(graph, self.writer.authorizations(), document_iri)?;
        if stored.as_deref() == Some(digest.as_str()) {
            tracing::info!(document = document_iri, "ontology document unchanged, skipping");
            report.skipped = true;
            return Ok(report);
        }

        tracing::info!(
            document = document_iri,
            classes = doc.classes.len(),
            data_properties = doc.data_properties.len(),
            object_properties = doc.object_properties.len(),
            "importing ontology document"
        );
        graph.begin_batch()?;
        let outcome = self
            .import_phases(doc, &mut report)
            .and_then(|()| {
                self.writer
                    .record_document(document_iri, &digest)
                    .map_err(ImportError::from)
            });
        if let Err(err) = outcome {
            if let Err(abort) = graph.abort_batch() {
                tracing::error!(document = document_iri, error = %abort, "failed to roll back import");
            }
            self.writer.invalidate_caches();
            tracing::error!(document = document_iri, error = %err, "ontology import failed, rolled back");
            return Err(err);
        }
        graph.commit_batch()?;
        self.writer.invalidate_caches();

        report.elapsed = started.elapsed();
        tracing::info!(
            document = document_iri,
            concepts = report.concepts,
            properties = report.properties,
            relationships = report.relationships,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "imported ontology document"
        );
        Ok(report)
    }

    fn import_phases(&self, doc: &OntologyDocument, report: &mut ImportReport) -> Result<(), ImportError> {
        report.annotation_properties = self.import_annotation_properties(doc)?;
        self.writer.invalidate_caches();

        let mut done = HashSet::new();
        for class in &doc.classes {
            self.import_class(doc, class, &mut done, &mut Vec::new())?;
        }
        report.concepts = done.len();
        self.writer.invalidate_caches();

        report.properties = self.import_data_properties(doc)?;
        self.writer.invalidate_caches();

        let mut done = HashSet::new();
        for decl in &doc.object_properties {
            self.import_object_property(doc, decl, &mut done, &mut Vec::new())?;
        }
        report.relationships = done.len();
        self.writer.invalidate_caches();

        report.inverses = self.import_inverses(doc)?;
        Ok(())
    }

    // ── Annotation properties ───────────────────────────────────────────

    fn import_annotation_properties(&self, doc: &OntologyDocument) -> Result<usize, ImportError> {
        let graph = self.writer.graph();
        let mut defined = 0;
        for decl in &doc.annotation_properties {
            if graph.is_property_defined(&decl.iri) {
                continue;
            }
            if graph.define_property(PropertyDefinition::new(decl.iri.clone(), ValueKind::String))? {
                defined += 1;
            }
        }
        Ok(defined)
    }

    // ── Classes ─────────────────────────────────────────────────────────

    fn import_class(
        &self,
        doc: &OntologyDocument,
        class: &ClassDecl,
        done: &mut HashSet<String>,
        pending: &mut Vec<String>,
    ) -> Result<(), ImportError> {
        if done.contains(&class.iri) {
            return Ok(());
        }
        if class.iri == ENTITY_CONCEPT_IRI || class.iri == ROOT_CONCEPT_IRI {
            // Bootstrapped concepts keep their place; only annotations apply.
            let parent = (class.iri == ENTITY_CONCEPT_IRI).then_some(ROOT_CONCEPT_IRI);
            self.writer
                .upsert_concept(parent, &class.iri, class.label(), true)?;
            self.apply_concept_annotations(doc, class)?;
            done.insert(class.iri.clone());
            return Ok(());
        }
        if class.super_classes.len() > 1 {
            return Err(ImportError::MultipleSuperClasses {
                iri: class.iri.clone(),
                count: class.super_classes.len(),
            });
        }
        let parent = class
            .super_classes
            .first()
            .map(String::as_str)
            .unwrap_or(ENTITY_CONCEPT_IRI);

        pending.push(class.iri.clone());
        if pending.iter().any(|p| p == parent) {
            return Err(cycle(&class.iri, pending.len()));
        }
        if let Some(parent_decl) = doc.class(parent) {
            self.import_class(doc, parent_decl, done, pending)?;
        }
        pending.pop();

        self.writer
            .upsert_concept(Some(parent), &class.iri, class.label(), true)?;
        self.apply_concept_annotations(doc, class)?;
        done.insert(class.iri.clone());
        tracing::debug!(iri = %class.iri, parent, "imported concept");
        Ok(())
    }

    fn apply_concept_annotations(&self, doc: &OntologyDocument, class: &ClassDecl) -> Result<(), ImportError> {
        let w = self.writer;
        let iri = class.iri.as_str();
        for annotation in &class.annotations {
            let value = annotation.value.as_str();
            match annotation.property.as_str() {
                vocab::RDFS_LABEL => {}
                attr::INTENT => w.add_intent(ElementKind::Concept, iri, value)?,
                name @ (attr::SEARCHABLE
                | attr::ADDABLE
                | attr::USER_VISIBLE
                | attr::UPDATEABLE
                | attr::DELETEABLE) => {
                    if let Some(flag) = parse_bool(iri, name, value) {
                        w.set_attribute(ElementKind::Concept, iri, name, flag)?;
                    }
                }
                name @ attr::GLYPH_ICON_FILE_NAME => {
                    self.set_icon(doc, iri, name, attr::GLYPH_ICON, value)?
                }
                name @ attr::GLYPH_ICON_SELECTED_FILE_NAME => {
                    self.set_icon(doc, iri, name, attr::GLYPH_ICON_SELECTED, value)?
                }
                name @ attr::MAP_GLYPH_ICON_FILE_NAME => {
                    self.set_icon(doc, iri, name, attr::MAP_GLYPH_ICON, value)?
                }
                name @ attr::ADD_RELATED_CONCEPT_WHITE_LIST => {
                    match serde_json::from_str::<Vec<String>>(value) {
                        Ok(_) => w.set_attribute(ElementKind::Concept, iri, name, value)?,
                        Err(e) => {
                            tracing::warn!(iri, annotation = name, error = %e, "expected a JSON array, skipping")
                        }
                    }
                }
                name @ (attr::COLOR
                | attr::DISPLAY_TYPE
                | attr::TITLE_FORMULA
                | attr::SUBTITLE_FORMULA
                | attr::TIME_FORMULA) => w.set_attribute(ElementKind::Concept, iri, name, value)?,
                other => w.set_concept_metadata(iri, other, value)?,
            }
        }
        Ok(())
    }

    fn set_icon(
        &self,
        doc: &OntologyDocument,
        iri: &str,
        file_attr: &str,
        blob_attr: &str,
        file_name: &str,
    ) -> Result<(), ImportError> {
        let path = match &doc.base_dir {
            Some(dir) => dir.join(file_name),
            None => PathBuf::from(file_name),
        };
        let bytes = std::fs::read(&path).map_err(|source| ImportError::IconNotFound {
            iri: iri.to_string(),
            path: path.display().to_string(),
            source,
        })?;
        self.writer
            .set_attribute(ElementKind::Concept, iri, file_attr, file_name)?;
        self.writer
            .set_attribute(ElementKind::Concept, iri, blob_attr, bytes)?;
        Ok(())
    }

    // ── Data properties ─────────────────────────────────────────────────

    fn import_data_properties(&self, doc: &OntologyDocument) -> Result<usize, ImportError> {
        let mut resolved = Vec::with_capacity(doc.data_properties.len());
        for decl in &doc.data_properties {
            if decl.ranges.len() != 1 {
                return Err(ImportError::InvalidRange {
                    iri: decl.iri.clone(),
                    count: decl.ranges.len(),
                });
            }
            resolved.push((decl, TypeResolver::resolve(&decl.ranges[0])?));
        }
        // Tables first so columns can name them as a domain.
        resolved.sort_by_key(|(_, data_type)| *data_type != PropertyType::ExtendedDataTable);

        let mut imported = Vec::new();
        for (decl, data_type) in &resolved {
            if self.import_data_property(decl, *data_type)? {
                imported.push(*decl);
            }
        }
        for decl in &imported {
            let dependents = dependent_iris(decl);
            self.writer
                .update_property_dependent_iris(&decl.iri, &dependents)?;
        }
        Ok(imported.len())
    }

    /// Returns false when the property had no resolvable owner and was skipped.
    fn import_data_property(&self, decl: &DataPropertyDecl, data_type: PropertyType) -> Result<bool, ImportError> {
        let iri = decl.iri.as_str();
        let mut spec = NewProperty::new(iri, data_type);
        spec.display_name = decl.label().map(str::to_string);
        spec.concept_iris = self.existing(ElementKind::Concept, iri, &decl.domains)?;
        spec.relationship_iris =
            self.existing(ElementKind::Relationship, iri, &decl.values(vocab::OBJECT_PROPERTY_DOMAIN))?;
        spec.table_iris =
            self.existing(ElementKind::Property, iri, &decl.values(vocab::EXTENDED_DATA_TABLE_DOMAIN))?;
        if spec.concept_iris.is_empty() && spec.relationship_iris.is_empty() && spec.table_iris.is_empty() {
            tracing::error!(iri, "data property has no resolvable domain, skipping");
            return Ok(false);
        }

        for annotation in &decl.annotations {
            let value = annotation.value.as_str();
            match annotation.property.as_str() {
                vocab::RDFS_LABEL
                | vocab::OBJECT_PROPERTY_DOMAIN
                | vocab::EXTENDED_DATA_TABLE_DOMAIN
                | vocab::DEPENDENT_PROPERTY_IRI => {}
                name @ attr::USER_VISIBLE => {
                    if let Some(b) = parse_bool(iri, name, value) {
                        spec.user_visible = b;
                    }
                }
                name @ attr::SEARCHABLE => spec.searchable = parse_bool(iri, name, value).or(spec.searchable),
                name @ attr::ADDABLE => {
                    if let Some(b) = parse_bool(iri, name, value) {
                        spec.addable = b;
                    }
                }
                name @ attr::SORTABLE => {
                    if let Some(b) = parse_bool(iri, name, value) {
                        spec.sortable = b;
                    }
                }
                name @ attr::UPDATEABLE => {
                    if let Some(b) = parse_bool(iri, name, value) {
                        spec.updateable = b;
                    }
                }
                name @ attr::DELETEABLE => {
                    if let Some(b) = parse_bool(iri, name, value) {
                        spec.deleteable = b;
                    }
                }
                attr::DISPLAY_TYPE => spec.display_type = Some(value.to_string()),
                attr::PROPERTY_GROUP => spec.property_group = Some(value.to_string()),
                attr::VALIDATION_FORMULA => spec.validation_formula = Some(value.to_string()),
                attr::DISPLAY_FORMULA => spec.display_formula = Some(value.to_string()),
                attr::INTENT => spec.intents.push(value.to_string()),
                name @ attr::BOOST => match value.trim().parse::<f64>() {
                    Ok(boost) => spec.boost = Some(boost),
                    Err(e) => tracing::warn!(iri, annotation = name, value, error = %e, "invalid boost, skipping"),
                },
                name @ attr::POSSIBLE_VALUES => {
                    match serde_json::from_str::<BTreeMap<String, String>>(value) {
                        Ok(values) => spec.possible_values = Some(values),
                        Err(e) => {
                            tracing::warn!(iri, annotation = name, error = %e, "expected a JSON object, skipping")
                        }
                    }
                }
                name @ attr::TEXT_INDEX_HINTS => match TypeResolver::parse_text_index_hints(value) {
                    Ok(hints) => spec
                        .text_index_hints
                        .get_or_insert_with(BTreeSet::new)
                        .extend(hints),
                    Err(message) => {
                        tracing::warn!(iri, annotation = name, error = %message, "skipping text index hints")
                    }
                },
                other => tracing::debug!(iri, annotation = other, "ignoring data property annotation"),
            }
        }

        let existed = self.writer.loader().vertex(ElementKind::Property, iri)?.is_some();
        self.writer.catalog().add_property_to(&spec)?;
        if existed {
            let domains: Vec<String> = spec
                .concept_iris
                .iter()
                .chain(&spec.relationship_iris)
                .cloned()
                .collect();
            self.writer.update_property_domain_iris(iri, &domains)?;
        }
        tracing::debug!(iri, data_type = %data_type, updated = existed, "imported data property");
        Ok(true)
    }

    /// The subset of `iris` naming existing elements; the rest are logged.
    fn existing<S: AsRef<str>>(
        &self,
        kind: ElementKind,
        owner_iri: &str,
        iris: &[S],
    ) -> Result<Vec<String>, OntologyError> {
        let loader = self.writer.loader();
        let mut found = Vec::with_capacity(iris.len());
        for iri in iris.iter().map(AsRef::as_ref) {
            if loader.vertex(kind, iri)?.is_some() {
                found.push(iri.to_string());
            } else {
                tracing::error!(iri = owner_iri, reference = iri, kind = kind.type_tag(), "unknown reference, skipping");
            }
        }
        Ok(found)
    }

    // ── Object properties ───────────────────────────────────────────────

    fn import_object_property(
        &self,
        doc: &OntologyDocument,
        decl: &ObjectPropertyDecl,
        done: &mut HashSet<String>,
        pending: &mut Vec<String>,
    ) -> Result<(), ImportError> {
        if done.contains(&decl.iri) {
            return Ok(());
        }
        if decl.super_properties.len() > 1 {
            return Err(ImportError::MultipleSuperClasses {
                iri: decl.iri.clone(),
                count: decl.super_properties.len(),
            });
        }
        let parent = decl
            .super_properties
            .first()
            .map(String::as_str)
            .filter(|p| *p != TOP_OBJECT_PROPERTY_IRI);

        if let Some(parent) = parent {
            pending.push(decl.iri.clone());
            if pending.iter().any(|p| p == parent) {
                return Err(cycle(&decl.iri, pending.len()));
            }
            if let Some(parent_decl) = doc.object_property(parent) {
                self.import_object_property(doc, parent_decl, done, pending)?;
            }
            pending.pop();
        }

        let iri = decl.iri.as_str();
        let domains = self.existing(ElementKind::Concept, iri, &decl.domains)?;
        let ranges = self.existing(ElementKind::Concept, iri, &decl.ranges)?;
        let w = self.writer;
        w.upsert_relationship(parent, &domains, &ranges, iri, true)?;
        if let Some(label) = decl.label() {
            w.set_attribute(ElementKind::Relationship, iri, attr::DISPLAY_NAME, label)?;
        }

        for annotation in &decl.annotations {
            let value = annotation.value.as_str();
            match annotation.property.as_str() {
                vocab::RDFS_LABEL => {}
                attr::INTENT => w.add_intent(ElementKind::Relationship, iri, value)?,
                name @ (attr::USER_VISIBLE | attr::DELETEABLE | attr::UPDATEABLE) => {
                    if let Some(flag) = parse_bool(iri, name, value) {
                        w.set_attribute(ElementKind::Relationship, iri, name, flag)?;
                    }
                }
                name @ (attr::TITLE_FORMULA | attr::SUBTITLE_FORMULA | attr::TIME_FORMULA) => {
                    w.set_attribute(ElementKind::Relationship, iri, name, value)?
                }
                other => tracing::debug!(iri, annotation = other, "ignoring object property annotation"),
            }
        }
        done.insert(decl.iri.clone());
        tracing::debug!(iri, domains = domains.len(), ranges = ranges.len(), "imported relationship");
        Ok(())
    }

    fn import_inverses(&self, doc: &OntologyDocument) -> Result<usize, ImportError> {
        let mut linked = 0;
        for decl in &doc.object_properties {
            let known = self.existing(ElementKind::Relationship, &decl.iri, &decl.inverse_of)?;
            for inverse in known {
                self.writer.set_inverse_of(&decl.iri, &inverse)?;
                linked += 1;
            }
        }
        Ok(linked)
    }
}

fn cycle(iri: &str, depth: usize) -> ImportError {
    ImportError::Ontology(OntologyError::HierarchyTooDeep {
        iri: iri.to_string(),
        max_depth: depth,
    })
}

fn parse_bool(iri: &str, annotation: &str, value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => {
            tracing::warn!(iri, annotation, value, "expected a boolean, skipping");
            None
        }
    }
}

/// Dependent IRIs given as repeated values or as one JSON array literal.
fn dependent_iris(decl: &DataPropertyDecl) -> Vec<String> {
    let mut iris = Vec::new();
    for value in decl.values(vocab::DEPENDENT_PROPERTY_IRI) {
        let value = value.trim();
        if value.starts_with('[') {
            match serde_json::from_str::<Vec<String>>(value) {
                Ok(list) => iris.extend(list),
                Err(e) => {
                    tracing::warn!(iri = %decl.iri, error = %e, "malformed dependent property list, skipping")
                }
            }
        } else if !value.is_empty() {
            iris.push(value.to_string());
        }
    }
    iris
}
