//! Normalized header & canonical-name -> ordinal map.

use std::collections::HashMap;

use crate::error::{EngineError, EngineResult};

/// Lower-cases and trims a header name into its canonical form.
pub fn canonicalize(name: &str) -> String {
    name.trim().to_lowercase()
}

/// The source header: original text preserved for output, plus a
/// canonical-name -> ordinal index map built once per open.
#[derive(Debug, Clone)]
pub struct Header {
    original: Vec<String>,
    ordinals: HashMap<String, usize>,
}

impl Header {
    pub fn from_fields<I, S>(fields: I) -> Header
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let original: Vec<String> = fields.into_iter().map(Into::into).collect();
        let mut ordinals = HashMap::with_capacity(original.len());

        for (i, name) in original.iter().enumerate() {
            // First occurrence wins on a duplicate canonical name, so
            // lookups stay deterministic regardless of resolution order.
            ordinals.entry(canonicalize(name)).or_insert(i);
        }

        Header { original, ordinals }
    }

    pub fn len(&self) -> usize {
        self.original.len()
    }

    pub fn is_empty(&self) -> bool {
        self.original.is_empty()
    }

    pub fn original(&self) -> &[String] {
        &self.original
    }

    pub fn ordinal_of(&self, canonical_name: &str) -> Option<usize> {
        self.ordinals.get(canonical_name).copied()
    }

    pub fn resolve(&self, canonical_name: &str) -> EngineResult<usize> {
        self.ordinal_of(canonical_name)
            .ok_or_else(|| EngineError::UnknownColumn(canonical_name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_trims_and_lowercases() {
        assert_eq!(canonicalize("  Country "), "country");
    }

    #[test]
    fn resolves_known_column() {
        let header = Header::from_fields(["id", "Country", " Total "]);
        assert_eq!(header.resolve("country").unwrap(), 1);
        assert_eq!(header.resolve("total").unwrap(), 2);
    }

    #[test]
    fn unknown_column_is_an_error() {
        let header = Header::from_fields(["id"]);
        assert!(header.resolve("missing").is_err());
    }

    #[test]
    fn preserves_original_text_for_output() {
        let header = Header::from_fields([" Country "]);
        assert_eq!(header.original(), &[" Country ".to_string()]);
    }
}
