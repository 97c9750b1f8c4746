//! Declarative schema generations for the `ecritures` collection.
//!
//! A generation is plain data: a version number and the set of indexed
//! attribute names. Migration order comes from the version numbers, not from
//! the declaration site, so histories stay order-independent in declaration.

/// One generation of the collection's on-disk layout.
///
/// Attribute names must be plain identifiers (letters, digits, underscores);
/// they become `json_extract` expression indexes on the document payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaGeneration {
    /// Strictly increasing generation number.
    pub version: i64,
    /// Indexed attributes of the document collection at this generation.
    pub indexed: &'static [&'static str],
}

/// The application's schema history, oldest to newest.
///
/// Generation 1 tracked a single `targetSize` goal and no timestamps.
/// Generation 2 splits the goal into `minSize`/`maxSize` and stamps every
/// document with `createdAt`/`modifiedAt`. Documents persisted under
/// generation 1 keep their `targetSize` key; the renamed fields read as
/// absent until the document is edited.
pub const SCHEMA_HISTORY: &[SchemaGeneration] = &[
    SchemaGeneration { version: 1, indexed: &["title", "targetSize"] },
    SchemaGeneration { version: 2, indexed: &["title", "minSize", "maxSize", "createdAt", "modifiedAt"] },
];

impl SchemaGeneration {
    /// Whether every indexed attribute is safe to splice into index DDL.
    pub(crate) fn attrs_are_identifiers(&self) -> bool {
        self.indexed
            .iter()
            .all(|attr| !attr.is_empty() && attr.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_versions_strictly_increase() {
        for pair in SCHEMA_HISTORY.windows(2) {
            assert!(pair[0].version < pair[1].version);
        }
    }

    #[test]
    fn test_history_attrs_are_identifiers() {
        for generation in SCHEMA_HISTORY {
            assert!(generation.attrs_are_identifiers());
        }
    }

    #[test]
    fn test_rejects_non_identifier_attr() {
        let generation = SchemaGeneration { version: 1, indexed: &["title; DROP TABLE ecritures"] };
        assert!(!generation.attrs_are_identifiers());
    }
}
