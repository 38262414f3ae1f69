use std::collections::HashSet;

use indexmap::{IndexMap, IndexSet};

/// One harvested row: column name to cell value, in column order.
pub type Record = IndexMap<String, String>;

/// Headers and rows decoded from a single page.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PageResult {
    pub headers: Vec<String>,
    pub rows: Vec<Record>,
}

/// Rows collected for one index, one page at a time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HarvestAccumulator {
    headers: Option<Vec<String>>,
    rows: Vec<Record>,
    pages: usize,
}

impl HarvestAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a page. The first page with headers fixes the header list.
    pub fn push_page(&mut self, page: PageResult) {
        if self.headers.is_none() && !page.headers.is_empty() {
            self.headers = Some(page.headers);
        }
        self.rows.extend(page.rows);
        self.pages += 1;
    }

    pub fn headers(&self) -> Option<&[String]> {
        self.headers.as_deref()
    }

    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    pub fn page_count(&self) -> usize {
        self.pages
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn into_table(self) -> SparseTable {
        SparseTable::from_records(&self.rows)
    }
}

/// Column-union view of a set of records, ready to be written out.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SparseTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl SparseTable {
    /// Builds the table from ragged records.
    ///
    /// Columns are the union of all keys in first-seen order, missing cells are
    /// empty. Columns and rows with no non-blank cell are dropped, then exact
    /// duplicate rows are removed keeping the first occurrence.
    pub fn from_records(records: &[Record]) -> Self {
        let union: IndexSet<&str> = records
            .iter()
            .flat_map(|record| record.keys().map(String::as_str))
            .collect();

        let grid: Vec<Vec<&str>> = records
            .iter()
            .map(|record| {
                union
                    .iter()
                    .map(|column| record.get(*column).map_or("", String::as_str))
                    .collect()
            })
            .collect();

        let kept: Vec<usize> = (0..union.len())
            .filter(|&i| grid.iter().any(|row| !is_blank(row[i])))
            .collect();

        let columns = kept
            .iter()
            .filter_map(|&i| union.get_index(i))
            .map(|column| column.to_string())
            .collect();

        let mut seen: HashSet<Vec<String>> = HashSet::new();
        let mut rows = Vec::with_capacity(grid.len());
        for row in &grid {
            let projected: Vec<String> = kept.iter().map(|&i| row[i].to_string()).collect();
            if projected.iter().all(|cell| is_blank(cell)) {
                continue;
            }
            if seen.insert(projected.clone()) {
                rows.push(projected);
            }
        }

        Self { columns, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of `column` in row order, if the column exists.
    pub fn column(&self, column: &str) -> Option<Vec<&str>> {
        let idx = self.columns.iter().position(|c| c == column)?;
        Some(self.rows.iter().map(|row| row[idx].as_str()).collect())
    }
}

fn is_blank(cell: &str) -> bool {
    cell.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, &str)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn accumulator_keeps_first_headers() {
        let mut acc = HarvestAccumulator::new();
        acc.push_page(PageResult {
            headers: vec!["A".into(), "B".into()],
            rows: vec![record(&[("A", "1"), ("B", "2")])],
        });
        acc.push_page(PageResult {
            headers: vec!["X".into()],
            rows: vec![],
        });
        assert_eq!(acc.headers(), Some(&["A".to_string(), "B".to_string()][..]));
        assert_eq!(acc.page_count(), 2);
        assert_eq!(acc.row_count(), 1);
    }

    #[test]
    fn empty_records_make_empty_table() {
        let table = SparseTable::from_records(&[]);
        assert!(table.columns.is_empty());
        assert!(table.is_empty());
    }
}
