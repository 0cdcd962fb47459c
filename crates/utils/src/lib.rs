pub mod fields;
pub mod table;

// Re-export commonly used items
pub use crate::fields::{
    doi_link, non_null_count, normalize_identifier, DOI_URL_PREFIX, PROVENANCE_COLUMN,
};
pub use crate::table::{read_table_csv, write_table_csv, Row, Table};
