use std::fmt;
use std::path::PathBuf;

use crate::decode::DecodeError;
use crate::filename::slugify;
use crate::persist::PersistError;

/// One harvestable table from the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDescriptor {
    pub title: String,
    /// Query-string id (HTML) or slug (GraphQL) addressing the remote table.
    pub key: String,
    /// Search endpoint and "match everything" parameters; HTML only.
    pub search: Option<SearchUrl>,
    pub category: Option<String>,
}

impl IndexDescriptor {
    /// Partition of the response cache owned by this index.
    pub fn cache_namespace(&self) -> String {
        slugify(&self.key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchUrl {
    pub base: String,
    pub params: Vec<(String, String)>,
}

impl SearchUrl {
    /// Base parameters with `name` set to `value`, replacing any existing value.
    pub fn params_with(&self, name: &str, value: &str) -> Vec<(String, String)> {
        let mut params: Vec<(String, String)> = self
            .params
            .iter()
            .filter(|(k, _)| k != name)
            .cloned()
            .collect();
        params.push((name.to_string(), value.to_string()));
        params
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HarvestEvent {
    IndexStarted {
        position: usize,
        total: usize,
        title: String,
    },
    PagesDiscovered {
        title: String,
        total_pages: u32,
    },
    PageHarvested {
        page: u32,
        total_pages: u32,
        rows: usize,
        from_cache: bool,
    },
    SoftFailure {
        page: u32,
        attempt: u32,
        reason: String,
    },
    IndexCompleted {
        position: usize,
        report: IndexReport,
    },
}

/// Result of harvesting one index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexReport {
    pub title: String,
    pub path: PathBuf,
    pub pages: usize,
    pub rows_written: usize,
    pub columns: Vec<String>,
}

/// Result of a catalog run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunSummary {
    pub start_index: usize,
    /// Position after the last completed index; pass it back to resume.
    pub next_index: usize,
    pub reports: Vec<IndexReport>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct FetchError {
    pub kind: FailureKind,
    pub message: String,
}

impl FetchError {
    pub(crate) fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InvalidUrl,
    HttpStatus(u16),
    Timeout,
    TooLarge { max_bytes: u64, actual: Option<u64> },
    Network,
    Cache,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidUrl => write!(f, "invalid url"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::TooLarge { max_bytes, actual } => {
                write!(f, "response too large (max {max_bytes}, actual {actual:?})")
            }
            FailureKind::Network => write!(f, "network error"),
            FailureKind::Cache => write!(f, "cache error"),
        }
    }
}

/// Anything that stops the harvest of an index.
#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error("gave up on page {page} after {attempts} soft failures")]
    RetriesExhausted { page: u32, attempts: u32 },
    #[error("index {title} has no search url")]
    MissingSearchUrl { title: String },
}
