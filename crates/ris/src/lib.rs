use anyhow::{Context, Result};
use encoding_rs::{UTF_8, WINDOWS_1252};
use regex::Regex;
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;
use utils::{Row, Table};

pub const PARSER_NAME: &str = "ris";

// Tag line: two-character tag, two spaces, a dash, an optional value.
static TAG_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Z][A-Z0-9])  -(?: (.*))?$").unwrap());

/// Line-based parser for RIS reference exports.
///
/// Produces one flat record per reference: repeated tags (authors, keywords)
/// are joined into a single string, and lines that match no tag continue
/// the previous value. The core stages treat the result exactly like any
/// other source table.
pub struct RisParser {
    list_separator: String,
}

impl Default for RisParser {
    fn default() -> Self {
        Self::new()
    }
}

impl RisParser {
    pub fn new() -> Self {
        Self {
            list_separator: "; ".to_string(),
        }
    }

    pub fn with_list_separator(mut self, separator: impl Into<String>) -> Self {
        self.list_separator = separator.into();
        self
    }

    /// Parses RIS text into flat records.
    ///
    /// `ER` closes a record; a trailing record without `ER` is kept if it
    /// has any field. Unknown tags keep the raw two-letter tag as their
    /// column name.
    pub fn parse(&self, text: &str) -> Result<Vec<Row>> {
        let mut records: Vec<Row> = Vec::new();
        let mut fields: Vec<(String, Vec<String>)> = Vec::new();
        let mut last_field: Option<usize> = None;

        for line in text.lines() {
            let line = line.trim_end_matches('\r');

            if let Some(caps) = TAG_LINE.captures(line) {
                let tag = &caps[1];
                let value = caps.get(2).map(|m| m.as_str().trim()).unwrap_or("");

                if tag == "ER" {
                    if !fields.is_empty() {
                        records.push(self.flatten(std::mem::take(&mut fields)));
                    }
                    last_field = None;
                    continue;
                }

                let name = column_name(tag);
                match fields.iter().position(|(existing, _)| existing == name) {
                    Some(idx) => {
                        fields[idx].1.push(value.to_string());
                        last_field = Some(idx);
                    }
                    None => {
                        fields.push((name.to_string(), vec![value.to_string()]));
                        last_field = Some(fields.len() - 1);
                    }
                }
            } else if !line.trim().is_empty() {
                // Continuation of the previous value (long abstracts wrap)
                if let Some(idx) = last_field {
                    if let Some(value) = fields[idx].1.last_mut() {
                        if !value.is_empty() {
                            value.push(' ');
                        }
                        value.push_str(line.trim());
                    }
                }
            }
        }

        if !fields.is_empty() {
            records.push(self.flatten(fields));
        }

        Ok(records)
    }

    /// Reads and parses one `.ris` file.
    pub fn parse_file<P: AsRef<Path>>(&self, path: P) -> Result<Vec<Row>> {
        let path = path.as_ref();
        let bytes = fs::read(path).with_context(|| format!("Cannot open {}", path.display()))?;
        let text = decode_export_bytes(&bytes);
        self.parse(&text)
            .with_context(|| format!("Parsing {}", path.display()))
    }

    fn flatten(&self, fields: Vec<(String, Vec<String>)>) -> Row {
        let mut row = Row::new();
        for (name, values) in fields {
            let non_empty: Vec<String> = values.into_iter().filter(|v| !v.is_empty()).collect();
            let value = if non_empty.is_empty() {
                Value::Null
            } else {
                Value::String(non_empty.join(&self.list_separator))
            };
            row.insert(name, value);
        }
        row
    }
}

/// Decodes export bytes: UTF-8 with BOM stripping, Windows-1252 fallback
/// for the exports that are not valid UTF-8.
pub fn decode_export_bytes(bytes: &[u8]) -> String {
    let (text, _, had_errors) = UTF_8.decode(bytes);
    if had_errors {
        let (text, _, _) = WINDOWS_1252.decode(bytes);
        text.into_owned()
    } else {
        text.into_owned()
    }
}

/// Collects flat records into a table whose columns appear in first-seen
/// order across all records.
pub fn records_to_table(records: Vec<Row>) -> Table {
    let mut columns: Vec<String> = Vec::new();
    for record in &records {
        for key in record.keys() {
            if !columns.iter().any(|c| c == key) {
                columns.push(key.clone());
            }
        }
    }

    let mut table = Table::new(columns);
    table.rows = records;
    table
}

/// Readable column names for the common RIS tags; anything else keeps the
/// raw tag.
fn column_name(tag: &str) -> &str {
    match tag {
        "TY" => "type_of_reference",
        "TI" | "T1" => "title",
        "AU" | "A1" => "authors",
        "A2" => "secondary_authors",
        "AB" | "N2" => "abstract",
        "PY" | "Y1" => "year",
        "DO" => "doi",
        "JO" | "JF" => "journal_name",
        "T2" => "secondary_title",
        "SP" => "start_page",
        "EP" => "end_page",
        "VL" => "volume",
        "IS" => "issue",
        "SN" => "issn",
        "UR" => "url",
        "KW" => "keywords",
        "N1" => "notes",
        "C1" => "custom1",
        "DB" => "name_of_database",
        "ID" => "id",
        "LA" => "language",
        "PB" => "publisher",
        "CY" => "place_published",
        "DA" => "date",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const BASIC: &str = "TY  - JOUR\nTI  - An Example Article\nAU  - Smith, John\nAU  - Doe, Jane\nPY  - 2021\nDO  - 10.1/x\nER  - \n";

    #[test]
    fn test_parse_basic_record() {
        let records = RisParser::new().parse(BASIC).unwrap();

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.get("type_of_reference").unwrap(), &json!("JOUR"));
        assert_eq!(record.get("title").unwrap(), &json!("An Example Article"));
        assert_eq!(record.get("year").unwrap(), &json!("2021"));
        assert_eq!(record.get("doi").unwrap(), &json!("10.1/x"));
    }

    #[test]
    fn test_repeated_tags_join_into_one_field() {
        let records = RisParser::new().parse(BASIC).unwrap();
        assert_eq!(
            records[0].get("authors").unwrap(),
            &json!("Smith, John; Doe, Jane")
        );
    }

    #[test]
    fn test_custom_list_separator() {
        let records = RisParser::new()
            .with_list_separator(" | ")
            .parse(BASIC)
            .unwrap();
        assert_eq!(
            records[0].get("authors").unwrap(),
            &json!("Smith, John | Doe, Jane")
        );
    }

    #[test]
    fn test_continuation_lines_extend_previous_value() {
        let input = "TY  - JOUR\nAB  - First part of the abstract\n  continues on a second line\nER  - \n";
        let records = RisParser::new().parse(input).unwrap();
        assert_eq!(
            records[0].get("abstract").unwrap(),
            &json!("First part of the abstract continues on a second line")
        );
    }

    #[test]
    fn test_er_separates_records_and_trailing_record_is_kept() {
        let input = "TY  - JOUR\nTI  - First\nER  - \nTY  - JOUR\nTI  - Second\n";
        let records = RisParser::new().parse(input).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("title").unwrap(), &json!("First"));
        assert_eq!(records[1].get("title").unwrap(), &json!("Second"));
    }

    #[test]
    fn test_unknown_tag_keeps_raw_name() {
        let input = "TY  - JOUR\nM3  - 10.1/x\nER  - \n";
        let records = RisParser::new().parse(input).unwrap();
        assert_eq!(records[0].get("M3").unwrap(), &json!("10.1/x"));
    }

    #[test]
    fn test_empty_tag_value_is_null() {
        let input = "TY  - JOUR\nDO  - \nER  - \n";
        let records = RisParser::new().parse(input).unwrap();
        assert!(records[0].get("doi").unwrap().is_null());
    }

    #[test]
    fn test_crlf_input() {
        let input = "TY  - JOUR\r\nTI  - Windows Export\r\nER  - \r\n";
        let records = RisParser::new().parse(input).unwrap();
        assert_eq!(records[0].get("title").unwrap(), &json!("Windows Export"));
    }

    #[test]
    fn test_decode_strips_utf8_bom() {
        let bytes = b"\xef\xbb\xbfTY  - JOUR\nER  - \n";
        let text = decode_export_bytes(bytes);
        assert!(text.starts_with("TY"));
    }

    #[test]
    fn test_decode_falls_back_to_windows_1252() {
        // 0xE9 is 'é' in Windows-1252 and invalid on its own in UTF-8
        let bytes = b"TI  - Caf\xe9\n";
        let text = decode_export_bytes(bytes);
        assert!(text.contains("Café"));
    }

    #[test]
    fn test_records_to_table_columns_in_first_seen_order() {
        let input =
            "TY  - JOUR\nTI  - First\nER  - \nTY  - JOUR\nTI  - Second\nDO  - 10.1/b\nER  - \n";
        let records = RisParser::new().parse(input).unwrap();
        let table = records_to_table(records);

        assert_eq!(table.columns, vec!["type_of_reference", "title", "doi"]);
        assert_eq!(table.len(), 2);
        assert!(table.rows[0].get("doi").is_none());
        assert_eq!(table.rows[1].get("doi").unwrap(), &json!("10.1/b"));
    }
}
