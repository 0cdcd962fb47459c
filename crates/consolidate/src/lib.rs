use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;
use utils::{doi_link, normalize_identifier, Row, Table, PROVENANCE_COLUMN};

/// Unified name of the identifier field the derived link is built from.
pub const DOI_COLUMN: &str = "DOI";

/// Name of the derived resolver-link column, emitted right after `DOI`.
pub const DOI_LINK_COLUMN: &str = "DOI_Link";

/// One declarative instruction: which column of each source feeds one
/// unified output column.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldRule {
    pub unified_name: String,
    /// Lower = present in more sources. Caller-supplied, drives column order.
    pub priority: i64,
    /// source-id -> column name in that source's export. Sources where the
    /// field does not exist are simply omitted.
    pub mappings: HashMap<String, String>,
}

/// The full column-mapping configuration, as loaded from the JSON file.
#[derive(Debug, Clone, Deserialize)]
pub struct MappingConfig {
    pub unified_schema: Vec<FieldRule>,
}

impl MappingConfig {
    /// Rejects a contradictory configuration before any row is processed:
    /// a `unified_name` used twice, or a rule that maps no source column.
    pub fn validate(&self) -> Result<()> {
        let mut seen: HashSet<&str> = HashSet::new();
        for rule in &self.unified_schema {
            if !seen.insert(rule.unified_name.as_str()) {
                return Err(anyhow!(
                    "Duplicate unified_name in column mapping: '{}'",
                    rule.unified_name
                ));
            }
            if rule.mappings.is_empty() {
                return Err(anyhow!(
                    "Field rule '{}' maps no source columns",
                    rule.unified_name
                ));
            }
        }
        Ok(())
    }

    /// Rules in output-column order: priority ascending, then unified name.
    pub fn sorted_rules(&self) -> Vec<&FieldRule> {
        let mut rules: Vec<&FieldRule> = self.unified_schema.iter().collect();
        rules.sort_by_key(|r| (r.priority, r.unified_name.clone()));
        rules
    }

    /// Every source-id referenced anywhere in the column mapping.
    pub fn source_ids(&self) -> HashSet<&str> {
        self.unified_schema
            .iter()
            .flat_map(|r| r.mappings.keys().map(|k| k.as_str()))
            .collect()
    }
}

/// Loads and validates a column-mapping configuration from a JSON file.
///
/// # Arguments
/// * `path` - Path to a JSON file with a top-level `unified_schema` array
///
/// # Returns
/// * `Result<MappingConfig>` - The validated configuration
pub fn load_mapping_config<P: AsRef<Path>>(path: P) -> Result<MappingConfig> {
    let path = path.as_ref();
    let contents =
        fs::read_to_string(path).with_context(|| format!("Cannot open {}", path.display()))?;
    let config: MappingConfig = serde_json::from_str(&contents)
        .with_context(|| format!("Parsing mapping config {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

/// One input table together with the identity it carries through the merge.
#[derive(Debug, Clone)]
pub struct SourceTable {
    /// Key used by the `mappings` tables, e.g. `scopus`.
    pub id: String,
    /// Display tag written to the provenance column, e.g. `Scopus`.
    pub tag: String,
    pub table: Table,
}

impl SourceTable {
    pub fn new(id: impl Into<String>, tag: impl Into<String>, table: Table) -> Self {
        Self {
            id: id.into(),
            tag: tag.into(),
            table,
        }
    }
}

/// Merges the source tables into one consolidated table.
///
/// Every field rule contributes one output column per row by indirection
/// through its `mappings` table; a source with no entry for the rule, or a
/// named column absent from a row, yields null. When a `DOI` rule exists, a
/// derived `DOI_Link` column follows it. With `include_provenance` the
/// source tag lands in a leading `Source_Database` column.
///
/// A source whose id is referenced by no rule at all only warns: its rows
/// still pass through with every mapped field null.
pub fn unify(
    sources: &[SourceTable],
    config: &MappingConfig,
    include_provenance: bool,
) -> Result<Table> {
    config.validate()?;

    let known = config.source_ids();
    for source in sources {
        if !known.contains(source.id.as_str()) {
            eprintln!(
                "⚠️ Source '{}' is not referenced by any field rule; all mapped fields will be empty",
                source.id
            );
        }
    }

    let rules = config.sorted_rules();
    let has_doi = rules.iter().any(|r| r.unified_name == DOI_COLUMN);

    let mut columns: Vec<String> = Vec::new();
    if include_provenance {
        columns.push(PROVENANCE_COLUMN.to_string());
    }
    for rule in &rules {
        columns.push(rule.unified_name.clone());
        if has_doi && rule.unified_name == DOI_COLUMN {
            columns.push(DOI_LINK_COLUMN.to_string());
        }
    }

    let mut out = Table::new(columns);
    for source in sources {
        for row in &source.table.rows {
            out.rows.push(unify_row(row, source, &rules, include_provenance));
        }
    }

    Ok(out)
}

fn unify_row(
    row: &Row,
    source: &SourceTable,
    rules: &[&FieldRule],
    include_provenance: bool,
) -> Row {
    let mut unified = Row::new();
    if include_provenance {
        unified.insert(
            PROVENANCE_COLUMN.to_string(),
            Value::String(source.tag.clone()),
        );
    }

    for rule in rules {
        let value = rule
            .mappings
            .get(&source.id)
            .and_then(|column| row.get(column))
            .cloned()
            .unwrap_or(Value::Null);

        if rule.unified_name == DOI_COLUMN {
            let link = normalize_identifier(&value)
                .map(|doi| Value::String(doi_link(&doi)))
                .unwrap_or(Value::Null);
            unified.insert(rule.unified_name.clone(), value);
            unified.insert(DOI_LINK_COLUMN.to_string(), link);
        } else {
            unified.insert(rule.unified_name.clone(), value);
        }
    }

    unified
}

/// Column count per priority level, for the end-of-run summary.
pub fn priority_counts(config: &MappingConfig) -> Vec<(i64, usize)> {
    let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
    for rule in &config.unified_schema {
        *counts.entry(rule.priority).or_insert(0) += 1;
    }
    counts.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rule(unified_name: &str, priority: i64, mappings: &[(&str, &str)]) -> FieldRule {
        FieldRule {
            unified_name: unified_name.to_string(),
            priority,
            mappings: mappings
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn make_table(columns: &[&str], rows: Vec<Value>) -> Table {
        let mut table = Table::new(columns.iter().map(|c| c.to_string()).collect());
        for fixture in rows {
            let obj = fixture.as_object().unwrap();
            let mut row = Row::new();
            for column in &table.columns {
                row.insert(
                    column.clone(),
                    obj.get(column.as_str()).cloned().unwrap_or(Value::Null),
                );
            }
            table.rows.push(row);
        }
        table
    }

    fn title_spec() -> MappingConfig {
        MappingConfig {
            unified_schema: vec![rule(
                "Title",
                1,
                &[("scopus", "Title"), ("webofscience", "Article Title")],
            )],
        }
    }

    #[test]
    fn test_duplicate_unified_name_is_rejected_with_the_name() {
        let spec = MappingConfig {
            unified_schema: vec![
                rule("Title", 1, &[("scopus", "Title")]),
                rule("Title", 2, &[("webofscience", "Article Title")]),
            ],
        };
        let err = spec.validate().unwrap_err();
        assert!(err.to_string().contains("'Title'"));
    }

    #[test]
    fn test_empty_mappings_is_rejected() {
        let spec = MappingConfig {
            unified_schema: vec![rule("Orphan", 3, &[])],
        };
        let err = spec.validate().unwrap_err();
        assert!(err.to_string().contains("'Orphan'"));
    }

    #[test]
    fn test_column_order_by_priority_then_name() {
        let spec = MappingConfig {
            unified_schema: vec![
                rule("Keywords", 2, &[("scopus", "Author Keywords")]),
                rule("Title", 1, &[("scopus", "Title")]),
                rule("Volume", 3, &[("scopus", "Volume")]),
                rule("Authors", 1, &[("scopus", "Authors")]),
            ],
        };
        let table = make_table(&["Title"], vec![]);
        let sources = [SourceTable::new("scopus", "Scopus", table)];
        let out = unify(&sources, &spec, false).unwrap();
        assert_eq!(out.columns, vec!["Authors", "Title", "Keywords", "Volume"]);
    }

    #[test]
    fn test_three_sources_concatenate_with_provenance_tags() {
        let spec = title_spec();
        let rows_of = |n: usize| (0..n).map(|i| json!({ "Title": format!("t{}", i) })).collect();
        let sources = [
            SourceTable::new("sciencedirect", "ScienceDirect", make_table(&["Title"], rows_of(10))),
            SourceTable::new("scopus", "Scopus", make_table(&["Title"], rows_of(8))),
            SourceTable::new("webofscience", "Web of Science", make_table(&["Article Title"], rows_of(12))),
        ];
        // the sciencedirect fixture has no mapping entry: its Title stays null
        let out = unify(&sources, &spec, true).unwrap();

        assert_eq!(out.len(), 30);
        assert_eq!(out.columns[0], PROVENANCE_COLUMN);
        let count_tag = |tag: &str| {
            out.rows
                .iter()
                .filter(|r| r.get(PROVENANCE_COLUMN) == Some(&json!(tag)))
                .count()
        };
        assert_eq!(count_tag("ScienceDirect"), 10);
        assert_eq!(count_tag("Scopus"), 8);
        assert_eq!(count_tag("Web of Science"), 12);
    }

    #[test]
    fn test_missing_source_and_missing_column_resolve_to_null() {
        let spec = MappingConfig {
            unified_schema: vec![
                rule("Title", 1, &[("scopus", "Title")]),
                rule("Abstract", 2, &[("webofscience", "Abstract")]),
            ],
        };
        let table = make_table(&["Other"], vec![json!({ "Other": "x" })]);
        let sources = [SourceTable::new("scopus", "Scopus", table)];
        let out = unify(&sources, &spec, false).unwrap();

        // "Title" maps to a column the row does not have; "Abstract" has no
        // scopus entry at all. Both are plain misses.
        assert!(out.rows[0].get("Title").unwrap().is_null());
        assert!(out.rows[0].get("Abstract").unwrap().is_null());
    }

    #[test]
    fn test_unknown_source_id_warns_but_does_not_fail() {
        let spec = title_spec();
        let table = make_table(&["Title"], vec![json!({ "Title": "t" })]);
        let sources = [SourceTable::new("pubmed", "PubMed", table)];
        let out = unify(&sources, &spec, true).unwrap();

        assert_eq!(out.len(), 1);
        assert!(out.rows[0].get("Title").unwrap().is_null());
        assert_eq!(out.rows[0].get(PROVENANCE_COLUMN).unwrap(), &json!("PubMed"));
    }

    #[test]
    fn test_doi_link_follows_doi_and_mirrors_nulls() {
        let spec = MappingConfig {
            unified_schema: vec![
                rule("DOI", 1, &[("scopus", "DOI")]),
                rule("Authors", 1, &[("scopus", "Authors")]),
            ],
        };
        let table = make_table(
            &["DOI", "Authors"],
            vec![
                json!({ "DOI": " 10.1/a ", "Authors": "Smith" }),
                json!({ "Authors": "Jones" }),
            ],
        );
        let sources = [SourceTable::new("scopus", "Scopus", table)];
        let out = unify(&sources, &spec, false).unwrap();

        assert_eq!(out.columns, vec!["Authors", "DOI", "DOI_Link"]);
        assert_eq!(
            out.rows[0].get("DOI_Link").unwrap(),
            &json!("https://doi.org/10.1/a")
        );
        assert!(out.rows[1].get("DOI_Link").unwrap().is_null());
    }

    #[test]
    fn test_priority_counts() {
        let spec = MappingConfig {
            unified_schema: vec![
                rule("A", 2, &[("scopus", "a")]),
                rule("B", 1, &[("scopus", "b")]),
                rule("C", 1, &[("scopus", "c")]),
            ],
        };
        assert_eq!(priority_counts(&spec), vec![(1, 2), (2, 1)]);
    }
}
