use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::fs;
use std::io;
use std::path::Path;

/// One record: column name -> value, kept in column order.
/// `Value::Null` is the single representation of a missing cell; an empty
/// CSV cell reads as null and a null writes back as an empty cell.
pub type Row = Map<String, Value>;

/// An in-memory delimited table: a fixed header plus its rows.
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Table {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Reads a table from CSV text with a header row.
    ///
    /// Cells are stored as strings; empty cells become `Value::Null`. Rows
    /// shorter than the header are padded with nulls, matching how the
    /// upstream exports pad missing trailing fields.
    pub fn from_csv_reader<R: io::Read>(reader: R) -> Result<Table> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let columns: Vec<String> = rdr
            .headers()
            .context("Reading CSV header row")?
            .iter()
            .map(|h| h.to_string())
            .collect();

        let mut rows = Vec::new();
        for (idx, record) in rdr.records().enumerate() {
            let record = record.with_context(|| format!("Reading CSV record {}", idx + 1))?;
            let mut row = Row::new();
            for (col_idx, name) in columns.iter().enumerate() {
                let cell = record.get(col_idx).unwrap_or("");
                row.insert(name.clone(), cell_to_value(cell));
            }
            rows.push(row);
        }

        Ok(Table { columns, rows })
    }

    /// Serializes the whole table to CSV bytes, header first.
    pub fn to_csv_bytes(&self) -> Result<Vec<u8>> {
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());

        wtr.write_record(&self.columns)
            .context("Writing CSV header row")?;

        for row in &self.rows {
            let record: Vec<String> = self
                .columns
                .iter()
                .map(|name| value_to_cell(row.get(name).unwrap_or(&Value::Null)))
                .collect();
            wtr.write_record(&record).context("Writing CSV record")?;
        }

        wtr.into_inner()
            .map_err(|e| anyhow::anyhow!("Flushing CSV output: {}", e))
    }
}

/// Loads a table from a CSV file.
///
/// # Arguments
/// * `path` - Path to a CSV file with a header row
///
/// # Returns
/// * `Result<Table>` - The parsed table, or an error naming the file
pub fn read_table_csv<P: AsRef<Path>>(path: P) -> Result<Table> {
    let path = path.as_ref();
    let file = fs::File::open(path).with_context(|| format!("Cannot open {}", path.display()))?;
    Table::from_csv_reader(file).with_context(|| format!("Parsing {}", path.display()))
}

/// Writes a table to a CSV file in one shot.
///
/// The full output is built in memory first and written with a single
/// `fs::write`, so a failed run never leaves a partial file behind. Parent
/// directories are created when missing.
pub fn write_table_csv<P: AsRef<Path>>(path: P, table: &Table) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Creating output dir: {}", parent.display()))?;
        }
    }
    let bytes = table.to_csv_bytes()?;
    fs::write(path, bytes).with_context(|| format!("Writing output file: {}", path.display()))?;
    Ok(())
}

pub fn cell_to_value(cell: &str) -> Value {
    if cell.is_empty() {
        Value::Null
    } else {
        Value::String(cell.to_string())
    }
}

pub fn value_to_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_read_csv_with_empty_cells() {
        let input = "Title,DOI,Year\nPaper A,10.1/a,2021\nPaper B,,\n";
        let table = Table::from_csv_reader(input.as_bytes()).unwrap();

        assert_eq!(table.columns, vec!["Title", "DOI", "Year"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0].get("DOI").unwrap(), &json!("10.1/a"));
        assert!(table.rows[1].get("DOI").unwrap().is_null());
        assert!(table.rows[1].get("Year").unwrap().is_null());
    }

    #[test]
    fn test_short_rows_are_padded_with_nulls() {
        let input = "A,B,C\nx\n";
        let table = Table::from_csv_reader(input.as_bytes()).unwrap();

        assert_eq!(table.rows[0].get("A").unwrap(), &json!("x"));
        assert!(table.rows[0].get("B").unwrap().is_null());
        assert!(table.rows[0].get("C").unwrap().is_null());
    }

    #[test]
    fn test_csv_round_trip_preserves_nulls_as_empty_cells() {
        let input = "Title,DOI\nPaper A,\nPaper B,10.1/b\n";
        let table = Table::from_csv_reader(input.as_bytes()).unwrap();
        let bytes = table.to_csv_bytes().unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), input);
    }

    #[test]
    fn test_missing_column_serializes_as_empty_cell() {
        let mut table = Table::new(vec!["A".to_string(), "B".to_string()]);
        let mut row = Row::new();
        row.insert("A".to_string(), json!("only a"));
        table.rows.push(row);

        let bytes = table.to_csv_bytes().unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "A,B\nonly a,\n");
    }

    #[test]
    fn test_has_column() {
        let table = Table::new(vec!["DOI".to_string()]);
        assert!(table.has_column("DOI"));
        assert!(!table.has_column("doi"));
    }
}
