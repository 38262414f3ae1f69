//! Binding for the GraphQL API.
//!
//! Each page is one POST of the index query; the payload already separates
//! headers, rows and the pagination envelope, so there is no markup to parse.

use std::sync::Arc;

use harvest_core::{PageResult, Record};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use url::Url;

use crate::decode::DecodeError;
use crate::fetch::{CacheFilter, FetchRequest, FetchResponse};
use crate::links::{parse_site_base, resolve_link, site_origin};
use crate::source::{clean_text, normalize_headers, PageSource, SourceKind, DETAILS_LABEL};
use crate::{HarvestError, IndexDescriptor};

pub const DEFAULT_QUERY: &str = r#"query IndexSearch($slug: String!, $pagination: PaginationInput) {
  indexSearch(slug: $slug, pagination: $pagination) {
    headers { title }
    rows { columns { content link } }
    pagination { page pageSize totalPages }
  }
}"#;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphQlOptions {
    pub endpoint: String,
    /// Field under `data` holding the index payload.
    pub root_field: String,
    pub page_size: u32,
    pub query: String,
    /// Extra variables merged into every request.
    pub variables: Value,
    /// Base for relative links; defaults to the endpoint's origin.
    pub site_base: Option<String>,
}

impl Default for GraphQlOptions {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            root_field: "indexSearch".to_string(),
            page_size: 100,
            query: DEFAULT_QUERY.to_string(),
            variables: json!({}),
            site_base: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Option<Vec<ErrorItem>>,
}

#[derive(Debug, Deserialize)]
struct ErrorItem {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct IndexPayload {
    #[serde(default)]
    headers: Vec<HeaderPayload>,
    #[serde(default)]
    rows: Vec<RowPayload>,
    #[serde(default)]
    pagination: Option<PaginationPayload>,
}

#[derive(Debug, Deserialize)]
struct HeaderPayload {
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RowPayload {
    #[serde(default)]
    columns: Vec<ColumnPayload>,
}

#[derive(Debug, Deserialize)]
struct ColumnPayload {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    link: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaginationPayload {
    total_pages: u32,
}

#[derive(Debug, Clone)]
pub struct GraphQlSource {
    options: GraphQlOptions,
    site_base: Option<Url>,
}

impl GraphQlSource {
    pub fn new(options: GraphQlOptions) -> Result<Self, DecodeError> {
        if Url::parse(&options.endpoint).is_err() {
            return Err(DecodeError::Malformed(format!(
                "graphql endpoint is not a valid url: {:?}",
                options.endpoint
            )));
        }
        let site_base = parse_site_base(options.site_base.as_deref())?
            .or_else(|| site_origin(&options.endpoint));
        Ok(Self { options, site_base })
    }

    pub fn options(&self) -> &GraphQlOptions {
        &self.options
    }

    /// Cache filter that keeps error payloads (and anything unparseable) out
    /// of the response cache, so a retried page is always re-requested.
    pub fn cache_filter() -> CacheFilter {
        Arc::new(|response: &FetchResponse| {
            serde_json::from_slice::<Envelope>(&response.body)
                .map(|envelope| upstream_errors(&envelope).is_none())
                .unwrap_or(false)
        })
    }

    fn variables(&self, index: &IndexDescriptor, page: u32) -> Value {
        let mut variables = match &self.options.variables {
            Value::Object(map) => Value::Object(map.clone()),
            _ => json!({}),
        };
        variables["slug"] = Value::String(index.key.clone());
        let pagination = &mut variables["pagination"];
        if !pagination.is_object() {
            *pagination = json!({ "pageSize": self.options.page_size });
        }
        pagination["page"] = json!(page);
        variables
    }

    fn payload(&self, response: &FetchResponse) -> Result<IndexPayload, DecodeError> {
        let envelope: Envelope = serde_json::from_slice(&response.body)
            .map_err(|err| DecodeError::Malformed(err.to_string()))?;
        if let Some(messages) = upstream_errors(&envelope) {
            return Err(DecodeError::Upstream(messages));
        }
        let root = envelope
            .data
            .as_ref()
            .and_then(|data| data.get(&self.options.root_field))
            .filter(|value| !value.is_null())
            .ok_or_else(|| {
                DecodeError::Malformed(format!("missing data.{}", self.options.root_field))
            })?;
        IndexPayload::deserialize(root).map_err(|err| DecodeError::Malformed(err.to_string()))
    }

    fn cell_value(&self, column: &ColumnPayload) -> String {
        let content = column.content.as_deref().map(clean_text).unwrap_or_default();
        match column.link.as_deref() {
            Some(link) if content == DETAILS_LABEL => resolve_link(link, self.site_base.as_ref(), &[])
                .map(|url| url.to_string())
                .unwrap_or_else(|| link.trim().to_string()),
            _ => content,
        }
    }
}

fn upstream_errors(envelope: &Envelope) -> Option<Vec<String>> {
    match envelope.errors.as_deref() {
        Some(errors) if !errors.is_empty() => {
            Some(errors.iter().map(|e| e.message.clone()).collect())
        }
        _ => None,
    }
}

impl PageSource for GraphQlSource {
    fn kind(&self) -> SourceKind {
        SourceKind::GraphQl
    }

    fn page_request(&self, index: &IndexDescriptor, page: u32) -> Result<FetchRequest, HarvestError> {
        let body = json!({
            "query": self.options.query,
            "variables": self.variables(index, page.max(1)),
        });
        Ok(FetchRequest::post_json(self.options.endpoint.clone(), body)
            .with_namespace(index.cache_namespace()))
    }

    fn total_pages(&self, response: &FetchResponse) -> Result<u32, DecodeError> {
        self.payload(response)?
            .pagination
            .map(|p| p.total_pages)
            .ok_or_else(|| DecodeError::Malformed("missing pagination.totalPages".into()))
    }

    fn decode_page(
        &self,
        response: &FetchResponse,
        known_headers: Option<&[String]>,
    ) -> Result<PageResult, DecodeError> {
        let payload = self.payload(response)?;
        let headers = match known_headers {
            Some(headers) => headers.to_vec(),
            None => normalize_headers(payload.headers.into_iter().map(|h| h.title)),
        };

        let rows = payload
            .rows
            .iter()
            .map(|row| {
                row.columns
                    .iter()
                    .zip(headers.iter())
                    .map(|(column, header)| (header.clone(), self.cell_value(column)))
                    .collect::<Record>()
            })
            .filter(|record| !record.is_empty())
            .collect();

        Ok(PageResult { headers, rows })
    }

    fn artifact_name<'a>(&self, index: &'a IndexDescriptor) -> &'a str {
        &index.key
    }

    fn clears_cache_after_write(&self) -> bool {
        false
    }
}
