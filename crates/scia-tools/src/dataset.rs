use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use chrono::NaiveDate;
use tracing::info;

use scia_core::error::{Result, SciaError};

const COLUMNS: [&str; 9] = [
    "date",
    "product_id",
    "product_name",
    "quantity_sold",
    "stock_level",
    "reorder_point",
    "supplier",
    "lead_time_days",
    "unit_cost",
];

/// One day of sales and stock for one product.
#[derive(Debug, Clone, PartialEq)]
pub struct SalesRecord {
    pub date: NaiveDate,
    pub product_id: String,
    pub product_name: String,
    pub quantity_sold: u64,
    pub stock_level: i64,
    pub reorder_point: i64,
    pub supplier: String,
    pub lead_time_days: u32,
    pub unit_cost: f64,
}

/// The tabular data source the specialist tools read from.
///
/// Loaded once; tools share it behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct SalesDataset {
    records: Vec<SalesRecord>,
}

impl SalesDataset {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SciaError::Dataset(format!("cannot read {}: {}", path.display(), e))
        })?;
        let dataset = Self::parse(&content)?;
        info!(
            path = %path.display(),
            records = dataset.records.len(),
            "Loaded sales dataset"
        );
        Ok(dataset)
    }

    /// Parse CSV text. Columns are located by header name, so their order is free.
    pub fn parse(content: &str) -> Result<Self> {
        let mut lines = content.lines().enumerate();
        let header = match lines.next() {
            Some((_, h)) => split_csv_line(h),
            None => return Err(SciaError::Dataset("empty CSV".into())),
        };

        let mut index = [0usize; COLUMNS.len()];
        for (slot, column) in index.iter_mut().zip(COLUMNS) {
            *slot = header
                .iter()
                .position(|h| h == column)
                .ok_or_else(|| SciaError::Dataset(format!("missing column '{}'", column)))?;
        }

        let mut records = Vec::new();
        for (line_no, line) in lines {
            if line.trim().is_empty() {
                continue;
            }
            let fields = split_csv_line(line);
            let field = |i: usize| -> Result<&str> {
                fields.get(index[i]).map(|s| s.as_str()).ok_or_else(|| {
                    SciaError::Dataset(format!(
                        "line {}: missing value for '{}'",
                        line_no + 1,
                        COLUMNS[i]
                    ))
                })
            };
            let bad = |i: usize, e: &dyn std::fmt::Display| {
                SciaError::Dataset(format!("line {}: bad '{}': {}", line_no + 1, COLUMNS[i], e))
            };

            records.push(SalesRecord {
                date: NaiveDate::parse_from_str(field(0)?, "%Y-%m-%d").map_err(|e| bad(0, &e))?,
                product_id: field(1)?.to_string(),
                product_name: field(2)?.to_string(),
                quantity_sold: field(3)?.parse().map_err(|e| bad(3, &e))?,
                stock_level: field(4)?.parse().map_err(|e| bad(4, &e))?,
                reorder_point: field(5)?.parse().map_err(|e| bad(5, &e))?,
                supplier: field(6)?.to_string(),
                lead_time_days: field(7)?.parse().map_err(|e| bad(7, &e))?,
                unit_cost: field(8)?.parse().map_err(|e| bad(8, &e))?,
            });
        }

        Ok(Self { records })
    }

    pub fn records(&self) -> &[SalesRecord] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All rows for one product, oldest first.
    pub fn history(&self, product_id: &str) -> Vec<&SalesRecord> {
        let mut rows: Vec<&SalesRecord> = self
            .records
            .iter()
            .filter(|r| r.product_id == product_id)
            .collect();
        rows.sort_by_key(|r| r.date);
        rows
    }

    /// Distinct (id, name) pairs in order of first appearance.
    pub fn products(&self) -> Vec<(&str, &str)> {
        let mut seen = HashSet::new();
        self.records
            .iter()
            .filter(|r| seen.insert((r.product_id.as_str(), r.product_name.as_str())))
            .map(|r| (r.product_id.as_str(), r.product_name.as_str()))
            .collect()
    }

    /// Most recent row per product, ordered by product id.
    pub fn latest_per_product(&self) -> Vec<&SalesRecord> {
        let mut latest: BTreeMap<&str, &SalesRecord> = BTreeMap::new();
        for record in &self.records {
            match latest.get(record.product_id.as_str()) {
                Some(current) if current.date > record.date => {}
                _ => {
                    latest.insert(record.product_id.as_str(), record);
                }
            }
        }
        latest.into_values().collect()
    }

    /// Rows grouped by supplier name (sorted).
    pub fn by_supplier(&self) -> BTreeMap<&str, Vec<&SalesRecord>> {
        let mut groups: BTreeMap<&str, Vec<&SalesRecord>> = BTreeMap::new();
        for record in &self.records {
            groups.entry(record.supplier.as_str()).or_default().push(record);
        }
        groups
    }
}

/// Split one CSV line, honouring double-quoted fields and `""` escapes.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current).trim().to_string()),
            _ => current.push(c),
        }
    }
    fields.push(current.trim().to_string());
    fields
}

/// Render rows as a right-aligned plain-text table with a header line.
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let line = |cells: Vec<&str>| -> String {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, w)| format!("{:>width$}", cell, width = w))
            .collect::<Vec<_>>()
            .join(" ")
    };

    let mut out = vec![line(headers.to_vec())];
    for row in rows {
        out.push(line(row.iter().map(|s| s.as_str()).collect()));
    }
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use scia_test_utils::{write_dataset, SAMPLE_CSV};

    #[test]
    fn parses_sample() {
        let ds = SalesDataset::parse(SAMPLE_CSV).unwrap();
        assert_eq!(ds.records().len(), 6);
        let first = &ds.records()[0];
        assert_eq!(first.product_name, "Lay's Classic");
        assert_eq!(first.date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(first.unit_cost, 1.5);
    }

    #[test]
    fn load_from_file() {
        let file = write_dataset(SAMPLE_CSV);
        let ds = SalesDataset::load(file.path()).unwrap();
        assert_eq!(ds.products(), vec![("P001", "Lay's Classic"), ("P002", "Pepsi 12-Pack")]);
    }

    #[test]
    fn missing_column_is_an_error() {
        let err = SalesDataset::parse("date,product_id\n2024-01-01,P001\n").unwrap_err();
        assert!(matches!(err, SciaError::Dataset(m) if m.contains("product_name")));
    }

    #[test]
    fn bad_number_reports_line() {
        let csv = SAMPLE_CSV.replace("2024-01-02,P001,Lay's Classic,100", "2024-01-02,P001,Lay's Classic,lots");
        let err = SalesDataset::parse(&csv).unwrap_err();
        assert!(matches!(err, SciaError::Dataset(m) if m.contains("line 4") && m.contains("quantity_sold")));
    }

    #[test]
    fn latest_row_per_product() {
        let ds = SalesDataset::parse(SAMPLE_CSV).unwrap();
        let latest = ds.latest_per_product();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[1].product_id, "P002");
        assert_eq!(latest[1].stock_level, 0);
    }

    #[test]
    fn quoted_fields() {
        assert_eq!(
            split_csv_line(r#"2024-01-01,P009,"Chips, ""BBQ""",5"#),
            vec!["2024-01-01", "P009", "Chips, \"BBQ\"", "5"]
        );
    }

    #[test]
    fn table_is_right_aligned() {
        let table = render_table(
            &["product_id", "stock"],
            &[vec!["P1".into(), "5".into()], vec!["P22".into(), "120".into()]],
        );
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "product_id stock");
        assert_eq!(lines[1], "        P1     5");
        assert_eq!(lines[2], "       P22   120");
    }
}
