//! Table detection results: CSV parsing and normalization.

use crate::genai::ExtractionOutput;
use serde::Serialize;

/// Tabular view of a CSV payload. The first record is the header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableView {
    /// Column names.
    pub header: Vec<String>,
    /// Body rows.
    pub rows: Vec<Vec<String>>,
}

impl TableView {
    /// Rows including the header.
    pub fn row_count(&self) -> usize {
        self.rows.len() + 1
    }
}

/// Parse CSV into a table view. Returns `None` when no non-blank record can be read.
pub fn parse_csv(csv: &str) -> Option<TableView> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(csv.as_bytes());

    let mut records = Vec::new();
    for record in reader.records() {
        let record = match record {
            Ok(record) => record,
            Err(error) => {
                tracing::debug!(%error, "Discarding unreadable CSV");
                return None;
            }
        };
        let row: Vec<String> = record.iter().map(str::to_string).collect();
        if row.iter().all(String::is_empty) {
            continue;
        }
        records.push(row);
    }

    let mut records = records.into_iter();
    let header = records.next()?;
    Some(TableView {
        header,
        rows: records.collect(),
    })
}

/// Keep the CSV only when the model flagged a table and the CSV yields at least one row.
pub fn normalize(output: &ExtractionOutput) -> Option<(String, TableView)> {
    if !output.is_table {
        return None;
    }
    let csv = output.csv_data.as_deref()?.trim();
    let view = parse_csv(csv)?;
    Some((csv.to_string(), view))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(is_table: bool, csv: Option<&str>) -> ExtractionOutput {
        ExtractionOutput {
            text: "x".into(),
            is_table,
            csv_data: csv.map(str::to_string),
        }
    }

    #[test]
    fn row_count_matches_csv_lines() {
        let csv = "name,qty\napples,3\n\"pears, green\",5\n";
        let view = parse_csv(csv).expect("table");
        assert_eq!(view.header, vec!["name", "qty"]);
        assert_eq!(view.rows[1], vec!["pears, green", "5"]);
        assert_eq!(view.row_count(), csv.trim().lines().count());
    }

    #[test]
    fn declared_table_without_csv_is_not_a_table() {
        assert!(normalize(&output(true, None)).is_none());
        assert!(normalize(&output(true, Some("  \n \n"))).is_none());
    }

    #[test]
    fn csv_is_ignored_unless_declared() {
        assert!(normalize(&output(false, Some("a,b\n1,2"))).is_none());
        let (csv, view) = normalize(&output(true, Some("a,b\n1,2\n"))).expect("table");
        assert_eq!(csv, "a,b\n1,2");
        assert_eq!(view.row_count(), 2);
    }

    #[test]
    fn ragged_rows_are_kept() {
        let view = parse_csv("a,b,c\n1\n2,3").expect("table");
        assert_eq!(view.rows, vec![vec!["1"], vec!["2", "3"]]);
    }
}
