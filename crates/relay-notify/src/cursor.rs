use std::collections::HashMap;

use relay_types::models::{CatalogRow, Watermark};

/// Per-table watermarks, process-local and written only by the poller.
///
/// A table is absent until it has been bootstrapped. A bootstrapped table
/// with no rows has a `None` watermark: everything that appears later is new.
#[derive(Debug, Default)]
pub struct CursorStore {
    marks: HashMap<String, Option<Watermark>>,
}

impl CursorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_bootstrapped(&self, table: &str) -> bool {
        self.marks.contains_key(table)
    }

    /// `None` if the table was never bootstrapped.
    pub fn get(&self, table: &str) -> Option<Option<Watermark>> {
        self.marks.get(table).copied()
    }

    pub fn bootstrap(&mut self, table: &str, latest: Option<&CatalogRow>) {
        self.marks
            .entry(table.to_string())
            .or_insert_with(|| latest.map(Watermark::at));
    }

    /// Move the table's watermark forward to `row`; never backwards.
    pub fn advance(&mut self, table: &str, row: &CatalogRow) -> bool {
        let mark = self.marks.entry(table.to_string()).or_insert(None);
        if let Some(current) = mark {
            return current.advance_to(row);
        }
        *mark = Some(Watermark::at(row));
        true
    }
}
