use crate::Phase;

/// Snapshot of pagination progress for logging and progress reporting.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PaginationView {
    pub phase: Phase,
    pub page: u32,
    pub total_pages: Option<u32>,
    pub pages_completed: usize,
    pub rows: usize,
    pub attempts: u32,
    pub last_soft_failure: Option<String>,
}

impl PaginationView {
    /// Human-readable `"page/total"` label; total is `?` until discovered.
    pub fn progress_label(&self) -> String {
        match self.total_pages {
            Some(total) => format!("{}/{}", self.page.min(total), total),
            None => format!("{}/?", self.page),
        }
    }
}
