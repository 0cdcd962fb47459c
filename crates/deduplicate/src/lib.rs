use anyhow::{anyhow, Result};
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use utils::{non_null_count, normalize_identifier, Table, PROVENANCE_COLUMN};

/// Default identifier column for bibliographic tables.
pub const DEFAULT_ID_COLUMN: &str = "DOI";

/// Column consulted for the human-review sample of duplicate groups.
const TITLE_COLUMN: &str = "Title";

/// How many duplicate groups the report keeps as examples.
const SAMPLE_LIMIT: usize = 3;

/// Which row of a duplicate group survives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Row with the most non-null fields; earliest occurrence wins ties.
    MostComplete,
    /// Row at the group's first occurrence.
    First,
    /// Row at the group's last occurrence.
    Last,
}

impl Strategy {
    pub fn parse(s: &str) -> Result<Strategy> {
        match s {
            "most_complete" => Ok(Strategy::MostComplete),
            "first" => Ok(Strategy::First),
            "last" => Ok(Strategy::Last),
            other => Err(anyhow!(
                "Unknown strategy '{}': expected most_complete, first or last",
                other
            )),
        }
    }
}

/// One duplicate group kept for human review.
#[derive(Debug, Clone)]
pub struct DuplicateSample {
    pub identifier: String,
    /// Provenance values of the group's rows, in row order.
    pub sources: Vec<String>,
    pub title: Option<String>,
}

/// Statistics about a deduplication run.
#[derive(Debug, Clone)]
pub struct DedupReport {
    pub total_rows: usize,
    pub rows_without_id: usize,
    /// Groups that actually had more than one row.
    pub duplicate_groups: usize,
    pub rows_removed: usize,
    pub final_rows: usize,
    pub generated_at: String,
    pub samples: Vec<DuplicateSample>,
}

impl DedupReport {
    pub fn has_duplicates(&self) -> bool {
        self.rows_removed > 0
    }
}

/// Removes duplicate rows sharing a normalized identifier.
///
/// Identifiers are trimmed and compared byte-for-byte; rows whose identifier
/// is null or blank are never grouped and pass through in place. The output
/// keeps the input's row order: each group's surviving row sits where the
/// group first occurred, later members are dropped.
///
/// With `merge_provenance`, the survivor's `Source_Database` cell becomes
/// the sorted, de-duplicated, comma-joined union of the provenance values
/// seen across the whole group, whichever row the strategy picked. Tables
/// without a provenance column skip the merge.
///
/// # Arguments
/// * `table` - The consolidated table to deduplicate
/// * `id_column` - Identifier column; missing from the table is fatal
/// * `strategy` - Which row of each group survives
/// * `merge_provenance` - Whether to union provenance across each group
///
/// # Returns
/// * `Result<(Table, DedupReport)>` - The deduplicated table and its report
pub fn deduplicate(
    table: &Table,
    id_column: &str,
    strategy: Strategy,
    merge_provenance: bool,
) -> Result<(Table, DedupReport)> {
    if !table.has_column(id_column) {
        return Err(anyhow!(
            "Column '{}' not found in the input table. Available columns: {}",
            id_column,
            table.columns.join(", ")
        ));
    }

    let ids: Vec<Option<String>> = table
        .rows
        .iter()
        .map(|row| normalize_identifier(row.get(id_column).unwrap_or(&Value::Null)))
        .collect();

    // identifier -> row indices, groups in first-seen order
    let mut groups: HashMap<String, Vec<usize>> = HashMap::new();
    let mut group_order: Vec<String> = Vec::new();
    for (idx, id) in ids.iter().enumerate() {
        if let Some(id) = id {
            let members = groups.entry(id.clone()).or_default();
            if members.is_empty() {
                group_order.push(id.clone());
            }
            members.push(idx);
        }
    }

    let has_provenance = table.has_column(PROVENANCE_COLUMN);

    let mut out = Table::new(table.columns.clone());
    for (idx, row) in table.rows.iter().enumerate() {
        let Some(id) = &ids[idx] else {
            out.rows.push(row.clone());
            continue;
        };

        let members = &groups[id];
        if idx != members[0] {
            continue;
        }

        let mut survivor = table.rows[select_row(table, members, strategy)].clone();
        if merge_provenance && has_provenance {
            if let Some(merged) = merged_provenance(table, members) {
                survivor.insert(PROVENANCE_COLUMN.to_string(), Value::String(merged));
            }
        }
        out.rows.push(survivor);
    }

    let duplicate_groups = group_order
        .iter()
        .filter(|id| groups[id.as_str()].len() > 1)
        .count();
    let samples = collect_samples(table, &groups, &group_order);
    let report = DedupReport {
        total_rows: table.len(),
        rows_without_id: ids.iter().filter(|id| id.is_none()).count(),
        duplicate_groups,
        rows_removed: table.len() - out.len(),
        final_rows: out.len(),
        generated_at: Utc::now().to_rfc3339(),
        samples,
    };

    Ok((out, report))
}

fn select_row(table: &Table, members: &[usize], strategy: Strategy) -> usize {
    match strategy {
        Strategy::First => members[0],
        Strategy::Last => members[members.len() - 1],
        Strategy::MostComplete => {
            let mut best = members[0];
            let mut best_count = non_null_count(&table.rows[best]);
            for &idx in &members[1..] {
                let count = non_null_count(&table.rows[idx]);
                if count > best_count {
                    best = idx;
                    best_count = count;
                }
            }
            best
        }
    }
}

/// Sorted, de-duplicated union of the group's provenance values, or `None`
/// when no row carries one.
fn merged_provenance(table: &Table, members: &[usize]) -> Option<String> {
    let mut values: Vec<String> = members
        .iter()
        .filter_map(|&idx| {
            table.rows[idx]
                .get(PROVENANCE_COLUMN)
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
        })
        .collect();
    values.sort();
    values.dedup();
    if values.is_empty() {
        None
    } else {
        Some(values.join(", "))
    }
}

fn collect_samples(
    table: &Table,
    groups: &HashMap<String, Vec<usize>>,
    group_order: &[String],
) -> Vec<DuplicateSample> {
    group_order
        .iter()
        .filter(|id| groups[id.as_str()].len() > 1)
        .take(SAMPLE_LIMIT)
        .map(|id| {
            let members = &groups[id.as_str()];
            let sources = members
                .iter()
                .filter_map(|&idx| {
                    table.rows[idx]
                        .get(PROVENANCE_COLUMN)
                        .and_then(|v| v.as_str())
                        .map(|s| s.to_string())
                })
                .collect();
            let title = members
                .first()
                .and_then(|&idx| table.rows[idx].get(TITLE_COLUMN))
                .and_then(|v| v.as_str())
                .map(|s| s.to_string());
            DuplicateSample {
                identifier: id.clone(),
                sources,
                title,
            }
        })
        .collect()
}
