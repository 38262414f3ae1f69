use serde::{Deserialize, Serialize};

use crate::decode::DecodeError;
use crate::fetch::{FetchRequest, FetchResponse};
use crate::{HarvestError, IndexDescriptor};
use harvest_core::PageResult;

/// Which version of the upstream service to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    Html,
    #[serde(alias = "api")]
    GraphQl,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Html => write!(f, "html"),
            SourceKind::GraphQl => write!(f, "graphql"),
        }
    }
}

/// Transport binding for one upstream variant: how to ask for a page and how
/// to read the answer. All markup and payload assumptions live behind this.
pub trait PageSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Request for 1-based `page` of `index`.
    fn page_request(&self, index: &IndexDescriptor, page: u32) -> Result<FetchRequest, HarvestError>;

    /// Total page count, read from the response to page 1.
    fn total_pages(&self, response: &FetchResponse) -> Result<u32, DecodeError>;

    /// Rows of one page. `known_headers` are the headers of the first decoded
    /// page, if any; they take precedence over whatever this page declares.
    fn decode_page(
        &self,
        response: &FetchResponse,
        known_headers: Option<&[String]>,
    ) -> Result<PageResult, DecodeError>;

    /// Name of the CSV artifact for `index`, without extension.
    fn artifact_name<'a>(&self, index: &'a IndexDescriptor) -> &'a str;

    /// Whether the index's cache namespace is cleared once its CSV is written.
    fn clears_cache_after_write(&self) -> bool;
}

/// Header labels with the `"Details"` fallback for blanks and a numeric
/// suffix for repeats, so every header is unique within a page.
pub fn normalize_headers<I, S>(labels: I) -> Vec<String>
where
    I: IntoIterator<Item = Option<S>>,
    S: AsRef<str>,
{
    let mut headers: Vec<String> = Vec::new();
    for label in labels {
        let base = label
            .as_ref()
            .map(|s| clean_text(AsRef::<str>::as_ref(s)))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DETAILS_LABEL.to_string());
        let mut candidate = base.clone();
        let mut n = 2;
        while headers.contains(&candidate) {
            candidate = format!("{base} {n}");
            n += 1;
        }
        headers.push(candidate);
    }
    headers
}

/// Label used for unlabeled columns, and the sentinel text of link cells.
pub const DETAILS_LABEL: &str = "Details";

/// Name of the synthetic column carrying the link of `column`.
pub fn url_column(column: &str) -> String {
    format!("{column} url")
}

/// Cell text with non-breaking spaces and line breaks folded into single spaces.
pub fn clean_text(raw: &str) -> String {
    raw.split(|c: char| c.is_whitespace() || c == '\u{a0}')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
