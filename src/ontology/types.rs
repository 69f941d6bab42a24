//! Datatype resolution and derived property flags.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::Deserialize;

use crate::error::OntologyError;
use crate::graph::{PropertyValue, TextIndexHint, ValueKind};

use super::PropertyType;

const XSD: &str = "http://www.w3.org/2001/XMLSchema#";
const VISALLO: &str = "http://visallo.org#";

/// Every datatype IRI that maps to a property type. Anything else is rejected.
const DATATYPES: &[(&str, &str, PropertyType)] = &[
    (XSD, "string", PropertyType::String),
    (XSD, "dateTime", PropertyType::Date),
    (XSD, "date", PropertyType::Date),
    (XSD, "gYear", PropertyType::Date),
    (XSD, "gYearMonth", PropertyType::Date),
    (XSD, "int", PropertyType::Double),
    (XSD, "double", PropertyType::Double),
    (XSD, "float", PropertyType::Double),
    (VISALLO, "geolocation", PropertyType::GeoLocation),
    (VISALLO, "directory/entity", PropertyType::DirectoryEntity),
    (VISALLO, "currency", PropertyType::Currency),
    (VISALLO, "image", PropertyType::Image),
    (VISALLO, "extendedDataTable", PropertyType::ExtendedDataTable),
    (XSD, "hexBinary", PropertyType::Binary),
    (XSD, "boolean", PropertyType::Boolean),
    (XSD, "integer", PropertyType::Integer),
    (XSD, "nonNegativeInteger", PropertyType::Integer),
    (XSD, "positiveInteger", PropertyType::Integer),
    (XSD, "unsignedLong", PropertyType::Integer),
    (XSD, "unsignedByte", PropertyType::Integer),
];

static RE_POINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^POINT\s*\(\s*(-?[\d.]+)\s*,\s*(-?[\d.]+)\s*\)$").unwrap()
});

static RE_LAT_LON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(-?[\d.]+)\s*,\s*(-?[\d.]+)$").unwrap());

#[derive(Deserialize)]
struct GeoJson {
    latitude: f64,
    longitude: f64,
}

/// Maps external datatype identifiers onto [`PropertyType`].
pub struct TypeResolver;

impl TypeResolver {
    /// Resolve a datatype IRI. Unknown IRIs are an error, never a guess.
    pub fn resolve(iri: &str) -> Result<PropertyType, OntologyError> {
        DATATYPES
            .iter()
            .find(|(ns, local, _)| {
                iri.len() == ns.len() + local.len() && iri.starts_with(ns) && iri.ends_with(local)
            })
            .map(|(_, _, t)| *t)
            .ok_or_else(|| OntologyError::UnknownDataType {
                iri: iri.to_string(),
            })
    }

    /// Every `(iri, type)` pair `resolve` accepts.
    pub fn known_datatypes() -> impl Iterator<Item = (String, PropertyType)> {
        DATATYPES
            .iter()
            .map(|(ns, local, t)| (format!("{ns}{local}"), *t))
    }

    /// Graph value kind a property of this type is stored as.
    pub fn value_kind(data_type: PropertyType) -> ValueKind {
        match data_type {
            PropertyType::String | PropertyType::DirectoryEntity | PropertyType::ExtendedDataTable => {
                ValueKind::String
            }
            PropertyType::Date => ValueKind::Date,
            PropertyType::Double | PropertyType::Currency => ValueKind::Double,
            PropertyType::Integer => ValueKind::Integer,
            PropertyType::Boolean => ValueKind::Boolean,
            PropertyType::GeoLocation => ValueKind::GeoPoint,
            PropertyType::Image | PropertyType::Binary => ValueKind::Binary,
        }
    }

    /// Hints applied when a property declares none.
    pub fn default_text_index_hints(data_type: PropertyType) -> BTreeSet<TextIndexHint> {
        match data_type {
            PropertyType::String => TextIndexHint::all(),
            PropertyType::Binary | PropertyType::Image | PropertyType::ExtendedDataTable => {
                BTreeSet::new()
            }
            _ => [TextIndexHint::ExactMatch].into_iter().collect(),
        }
    }

    /// Whether a property is searchable.
    ///
    /// An explicit flag always wins. Without one, the property is searchable
    /// unless its hints were declared as `NONE`. Type-default hints play no
    /// part here.
    pub fn determine_searchable(
        text_index_hints: Option<&BTreeSet<TextIndexHint>>,
        explicit: Option<bool>,
    ) -> bool {
        match (explicit, text_index_hints) {
            (Some(flag), _) => flag,
            (None, Some(hints)) => !hints.is_empty(),
            (None, None) => true,
        }
    }

    /// Parse a comma-separated hint list. `NONE` disables indexing, `ALL` enables both.
    pub fn parse_text_index_hints(raw: &str) -> Result<BTreeSet<TextIndexHint>, String> {
        let mut hints = BTreeSet::new();
        for part in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            match part.to_ascii_uppercase().as_str() {
                "NONE" => {}
                "ALL" => hints.extend(TextIndexHint::all()),
                other => match TextIndexHint::parse(other) {
                    Some(h) => {
                        hints.insert(h);
                    }
                    None => return Err(format!("unknown text index hint \"{part}\"")),
                },
            }
        }
        Ok(hints)
    }

    /// Convert a raw string into a typed value.
    pub fn convert_string(
        iri: &str,
        data_type: PropertyType,
        raw: &str,
    ) -> Result<PropertyValue, OntologyError> {
        let invalid = |message: String| OntologyError::InvalidValue {
            iri: iri.to_string(),
            data_type: data_type.to_string(),
            value: raw.to_string(),
            message,
        };
        let trimmed = raw.trim();

        match data_type {
            PropertyType::String | PropertyType::DirectoryEntity => {
                Ok(PropertyValue::String(raw.to_string()))
            }
            PropertyType::Date => parse_date(trimmed)
                .map(PropertyValue::Date)
                .ok_or_else(|| invalid("expected yyyy-MM-dd[ HH:mm[:ss]] or epoch millis".into())),
            PropertyType::Double | PropertyType::Currency => trimmed
                .parse::<f64>()
                .map(PropertyValue::Double)
                .map_err(|e| invalid(e.to_string())),
            PropertyType::Integer => trimmed
                .parse::<i64>()
                .map(PropertyValue::Integer)
                .map_err(|e| invalid(e.to_string())),
            PropertyType::Boolean => match trimmed.to_ascii_lowercase().as_str() {
                "true" => Ok(PropertyValue::Boolean(true)),
                "false" => Ok(PropertyValue::Boolean(false)),
                _ => Err(invalid("expected true or false".into())),
            },
            PropertyType::GeoLocation => parse_geo(trimmed)
                .map(|(latitude, longitude)| PropertyValue::GeoPoint {
                    latitude,
                    longitude,
                })
                .ok_or_else(|| invalid("expected JSON, POINT(lat, lon) or lat, lon".into())),
            PropertyType::Image | PropertyType::Binary | PropertyType::ExtendedDataTable => {
                Err(invalid("type has no string form".into()))
            }
        }
    }
}

fn parse_date(s: &str) -> Option<i64> {
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(dt.and_utc().timestamp_millis());
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc().timestamp_millis());
    }
    s.parse::<i64>().ok()
}

fn parse_geo(s: &str) -> Option<(f64, f64)> {
    if s.starts_with('{') {
        let geo: GeoJson = serde_json::from_str(s).ok()?;
        return Some((geo.latitude, geo.longitude));
    }
    let caps = RE_POINT.captures(s).or_else(|| RE_LAT_LON.captures(s))?;
    let lat = caps.get(1)?.as_str().parse().ok()?;
    let lon = caps.get(2)?.as_str().parse().ok()?;
    Some((lat, lon))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hints(list: &[TextIndexHint]) -> BTreeSet<TextIndexHint> {
        list.iter().copied().collect()
    }

    #[test]
    fn every_known_datatype_resolves() {
        for (iri, expected) in TypeResolver::known_datatypes() {
            assert_eq!(TypeResolver::resolve(&iri).unwrap(), expected, "{iri}");
        }
        assert_eq!(
            TypeResolver::resolve("http://www.w3.org/2001/XMLSchema#int").unwrap(),
            PropertyType::Double
        );
        assert_eq!(
            TypeResolver::resolve("http://visallo.org#directory/entity").unwrap(),
            PropertyType::DirectoryEntity
        );
    }

    #[test]
    fn unknown_datatype_is_an_error() {
        for iri in [
            "http://www.w3.org/2001/XMLSchema#long",
            "http://www.w3.org/2001/XMLSchema#",
            "string",
            "http://visallo.org#string",
        ] {
            let err = TypeResolver::resolve(iri).unwrap_err();
            assert!(matches!(err, OntologyError::UnknownDataType { .. }), "{iri}");
        }
    }

    #[test]
    fn searchable_matrix() {
        let none = hints(&[]);
        let some = hints(&[TextIndexHint::ExactMatch]);

        assert!(!TypeResolver::determine_searchable(Some(&none), None));
        assert!(TypeResolver::determine_searchable(Some(&some), None));
        assert!(!TypeResolver::determine_searchable(Some(&none), Some(false)));
        assert!(!TypeResolver::determine_searchable(Some(&some), Some(false)));
        assert!(TypeResolver::determine_searchable(Some(&none), Some(true)));
        assert!(!TypeResolver::determine_searchable(None, Some(false)));
    }

    #[test]
    fn undeclared_hints_are_searchable_for_every_type() {
        assert!(TypeResolver::determine_searchable(None, None));
        // Binary-like types default to no text index, yet stay searchable.
        for t in [PropertyType::Binary, PropertyType::Image, PropertyType::ExtendedDataTable] {
            assert!(TypeResolver::default_text_index_hints(t).is_empty(), "{t}");
        }
    }

    #[test]
    fn parse_hint_lists() {
        assert!(TypeResolver::parse_text_index_hints("NONE").unwrap().is_empty());
        assert_eq!(TypeResolver::parse_text_index_hints("ALL").unwrap().len(), 2);
        assert_eq!(
            TypeResolver::parse_text_index_hints("EXACT_MATCH, full_text").unwrap(),
            TextIndexHint::all()
        );
        assert!(TypeResolver::parse_text_index_hints("FUZZY").is_err());
    }

    #[test]
    fn convert_dates() {
        let d = TypeResolver::convert_string("p", PropertyType::Date, "1970-01-02").unwrap();
        assert_eq!(d, PropertyValue::Date(86_400_000));
        let dt =
            TypeResolver::convert_string("p", PropertyType::Date, "1970-01-01 00:01").unwrap();
        assert_eq!(dt, PropertyValue::Date(60_000));
        let secs =
            TypeResolver::convert_string("p", PropertyType::Date, "1970-01-01 00:00:05").unwrap();
        assert_eq!(secs, PropertyValue::Date(5_000));
        let millis = TypeResolver::convert_string("p", PropertyType::Date, "1234").unwrap();
        assert_eq!(millis, PropertyValue::Date(1234));
        assert!(TypeResolver::convert_string("p", PropertyType::Date, "yesterday").is_err());
    }

    #[test]
    fn convert_geo_forms() {
        let expected = PropertyValue::GeoPoint {
            latitude: 38.9,
            longitude: -77.0,
        };
        for raw in [
            r#"{"latitude": 38.9, "longitude": -77.0}"#,
            "POINT(38.9, -77.0)",
            "38.9, -77.0",
        ] {
            assert_eq!(
                TypeResolver::convert_string("p", PropertyType::GeoLocation, raw).unwrap(),
                expected,
                "{raw}"
            );
        }
    }

    #[test]
    fn convert_scalars() {
        assert_eq!(
            TypeResolver::convert_string("p", PropertyType::Integer, " 42 ").unwrap(),
            PropertyValue::Integer(42)
        );
        assert_eq!(
            TypeResolver::convert_string("p", PropertyType::Currency, "9.99").unwrap(),
            PropertyValue::Double(9.99)
        );
        assert_eq!(
            TypeResolver::convert_string("p", PropertyType::Boolean, "TRUE").unwrap(),
            PropertyValue::Boolean(true)
        );
        let err = TypeResolver::convert_string("p", PropertyType::Integer, "4.2").unwrap_err();
        assert!(matches!(err, OntologyError::InvalidValue { .. }));
        assert!(TypeResolver::convert_string("p", PropertyType::Image, "x").is_err());
    }
}
