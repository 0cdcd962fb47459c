use serde_json::Value;

/// Name of the column recording which database a row came from.
pub const PROVENANCE_COLUMN: &str = "Source_Database";

/// Prefix used to derive a resolver link from a DOI.
pub const DOI_URL_PREFIX: &str = "https://doi.org/";

/// Normalizes an identifier cell for comparison.
///
/// Surrounding whitespace is trimmed and an empty result counts as missing.
/// No case folding: DOI suffixes can be case-sensitive, so comparison stays
/// byte-for-byte.
pub fn normalize_identifier(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Counts the non-null cells of a row, across every column it carries.
pub fn non_null_count(row: &crate::table::Row) -> usize {
    row.values().filter(|v| !v.is_null()).count()
}

/// Builds the resolver link for an already-normalized DOI string.
pub fn doi_link(doi: &str) -> String {
    format!("{}{}", DOI_URL_PREFIX, doi)
}
