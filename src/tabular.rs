use std::collections::HashMap;
use std::path::Path;

use csv::ReaderBuilder;
use tracing::{info, warn};

use crate::error::LoaderError;

/// One delimited-text file read wholesale into memory. Cells are trimmed;
/// empty cells become `None` so downstream code has a single notion of
/// "missing".
#[derive(Debug, Clone, Default)]
pub struct Table {
    headers: Vec<String>,
    index: HashMap<String, usize>,
    rows: Vec<Vec<Option<String>>>,
}

impl Table {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        let index = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.clone(), i))
            .collect();
        Self { headers, index, rows }
    }

    pub fn from_path(path: &Path) -> Result<Self, LoaderError> {
        // flexible(true): tolerate rows with a stray column instead of
        // failing the whole file.
        let mut rdr = ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|e| LoaderError::Input {
                path: path.display().to_string(),
                source: e,
            })?;

        let headers: Vec<String> = rdr
            .headers()
            .map_err(|e| LoaderError::Input {
                path: path.display().to_string(),
                source: e,
            })?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut rows = Vec::new();
        let mut bad_rows = 0usize;
        for record in rdr.records() {
            match record {
                Ok(rec) => {
                    let mut row: Vec<Option<String>> = rec
                        .iter()
                        .map(|cell| {
                            let cell = cell.trim();
                            if cell.is_empty() { None } else { Some(cell.to_string()) }
                        })
                        .collect();
                    row.resize(headers.len(), None);
                    rows.push(row);
                }
                Err(_) => bad_rows += 1,
            }
        }
        if bad_rows > 0 {
            warn!(path = %path.display(), bad_rows, "dropped unreadable rows");
        }
        info!(path = %path.display(), rows = rows.len(), "read input file");

        Ok(Self::new(headers, rows))
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().map(|cells| Row { table: self, cells })
    }

    /// Rename source column headers in place; names without a match are
    /// ignored, since exports routinely gain and lose columns.
    pub fn rename_columns(&mut self, mapping: &[(&str, &str)]) {
        for (from, to) in mapping {
            if let Some(idx) = self.index.remove(*from) {
                self.headers[idx] = to.to_string();
                self.index.insert(to.to_string(), idx);
            }
        }
    }

    /// Overwrite (or append) a column with per-row computed values.
    pub fn set_column(&mut self, name: &str, values: Vec<Option<String>>) {
        debug_assert_eq!(values.len(), self.rows.len());
        let idx = *self.index.entry(name.to_string()).or_insert_with(|| {
            self.headers.push(name.to_string());
            self.headers.len() - 1
        });
        for (row, value) in self.rows.iter_mut().zip(values) {
            if row.len() <= idx {
                row.resize(idx + 1, None);
            }
            row[idx] = value;
        }
    }

    /// Columns from `required` that this table does not carry.
    pub fn missing_columns(&self, required: &[&str]) -> Vec<String> {
        required
            .iter()
            .filter(|c| !self.index.contains_key(**c))
            .map(|c| c.to_string())
            .collect()
    }
}

/// Borrowed view of one row with access by column name.
#[derive(Clone, Copy)]
pub struct Row<'a> {
    table: &'a Table,
    cells: &'a Vec<Option<String>>,
}

impl<'a> Row<'a> {
    /// Value of `column`, or `None` when the column is absent or the cell
    /// is empty. Unknown columns are not an error: exports differ.
    pub fn get(&self, column: &str) -> Option<&'a str> {
        let idx = *self.table.index.get(column)?;
        self.cells.get(idx)?.as_deref()
    }

    pub fn get_or<'b>(&'b self, column: &str, default: &'a str) -> &'a str {
        self.get(column).unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        Table::new(
            vec!["Employee Code".into(), "Name".into(), "Grade".into()],
            vec![
                vec![Some("EMP-001".into()), Some("Asha".into()), None],
                vec![Some("EMP-002".into()), Some("Ravi".into()), Some("L2".into())],
            ],
        )
    }

    #[test]
    fn get_by_name_and_missing_cell() {
        let t = sample();
        let rows: Vec<_> = t.rows().collect();
        assert_eq!(rows[0].get("Employee Code"), Some("EMP-001"));
        assert_eq!(rows[0].get("Grade"), None);
        assert_eq!(rows[0].get("No Such Column"), None);
        assert_eq!(rows[1].get_or("Grade", "L1"), "L2");
        assert_eq!(rows[0].get_or("Grade", "L1"), "L1");
    }

    #[test]
    fn rename_known_columns_only() {
        let mut t = sample();
        t.rename_columns(&[("Name", "employee_name"), ("Ghost", "x")]);
        assert!(t.headers().contains(&"employee_name".to_string()));
        assert!(!t.headers().contains(&"Name".to_string()));
        let rows: Vec<_> = t.rows().collect();
        assert_eq!(rows[0].get("employee_name"), Some("Asha"));
    }

    #[test]
    fn set_column_appends_and_overwrites() {
        let mut t = sample();
        t.set_column("employee_code", vec![Some("E1".into()), None]);
        let rows: Vec<_> = t.rows().collect();
        assert_eq!(rows[0].get("employee_code"), Some("E1"));
        assert_eq!(rows[1].get("employee_code"), None);
    }

    #[test]
    fn missing_columns_reported() {
        let t = sample();
        let missing = t.missing_columns(&["Employee Code", "Email"]);
        assert_eq!(missing, vec!["Email".to_string()]);
    }
}
