//! Concept identities.
//!
//! Programs, workflows and states are all named by a concept from an external
//! dictionary. The engine treats a concept as an opaque identifier plus a bag
//! of localised names: two concepts are the same record iff their surrogate
//! ids are equal, regardless of naming.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::NonEmptyText;

/// One localised name of a concept.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptName {
    name: NonEmptyText,
    locale: String,
}

impl ConceptName {
    pub fn new(name: NonEmptyText, locale: impl Into<String>) -> Self {
        Self {
            name,
            locale: locale.into(),
        }
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }
}

/// An opaque named identifier from the concept dictionary.
///
/// The first name in the list is the display name. Name lookup matches
/// against every name in every locale, first match wins; there is no locale
/// preference order at this layer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Concept {
    uuid: Uuid,
    names: Vec<ConceptName>,
}

impl Concept {
    /// Build a concept with a single display name in the given locale.
    pub fn new(uuid: Uuid, display_name: NonEmptyText, locale: impl Into<String>) -> Self {
        Self {
            uuid,
            names: vec![ConceptName::new(display_name, locale)],
        }
    }

    /// Add a further localised name and return the concept.
    pub fn with_name(mut self, name: NonEmptyText, locale: impl Into<String>) -> Self {
        self.names.push(ConceptName::new(name, locale));
        self
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn names(&self) -> &[ConceptName] {
        &self.names
    }

    /// The display name (the first recorded name).
    pub fn display(&self) -> &str {
        self.names
            .first()
            .map(ConceptName::name)
            .unwrap_or("<unnamed>")
    }

    /// Whether any name in any locale matches `query` exactly.
    pub fn has_name(&self, query: &str) -> bool {
        self.names.iter().any(|n| n.name() == query)
    }
}

impl PartialEq for Concept {
    fn eq(&self, other: &Self) -> bool {
        self.uuid == other.uuid
    }
}

impl Eq for Concept {}

impl std::hash::Hash for Concept {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.uuid.hash(state);
    }
}
