//! Binding for the server-rendered search pages.
//!
//! A search page holds one results `<table>` (labels in `thead th`, rows in
//! `tbody tr`) and, when there is more than one page, a pager whose "last
//! page" link carries the zero-based number of the final page.

use harvest_core::{PageResult, Record};
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::decode::DecodeError;
use crate::fetch::{FetchRequest, FetchResponse};
use crate::links::{parse_site_base, resolve_link, site_origin};
use crate::source::{clean_text, normalize_headers, url_column, PageSource, SourceKind};
use crate::{HarvestError, IndexDescriptor};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HtmlOptions {
    /// Query parameter selecting the page.
    pub page_param: String,
    /// Whether the upstream numbers pages from 0.
    pub zero_based_pages: bool,
    /// Tried in order; the first match is the "last page" link.
    pub last_page_selectors: Vec<String>,
    pub table_selector: String,
    /// Hrefs that point nowhere and must not become url columns.
    pub ignored_links: Vec<String>,
    /// Base for relative links; defaults to the origin of the fetched page.
    pub site_base: Option<String>,
}

impl Default for HtmlOptions {
    fn default() -> Self {
        Self {
            page_param: "page".to_string(),
            zero_based_pages: true,
            last_page_selectors: vec![
                r#"a[title="Go to last page"]"#.to_string(),
                "li.pager__item--last a".to_string(),
                "li.pager-last a".to_string(),
            ],
            table_selector: "table".to_string(),
            ignored_links: vec!["/".to_string()],
            site_base: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HtmlSource {
    options: HtmlOptions,
    site_base: Option<Url>,
}

impl HtmlSource {
    /// Fails if any configured selector does not parse.
    pub fn new(options: HtmlOptions) -> Result<Self, DecodeError> {
        for raw in options
            .last_page_selectors
            .iter()
            .chain(std::iter::once(&options.table_selector))
        {
            selector(raw)?;
        }
        let site_base = parse_site_base(options.site_base.as_deref())?;
        Ok(Self { options, site_base })
    }

    pub fn options(&self) -> &HtmlOptions {
        &self.options
    }

    fn link_base(&self, response: &FetchResponse) -> Option<Url> {
        self.site_base
            .clone()
            .or_else(|| site_origin(&response.final_url))
    }

    fn results_table<'a>(&self, doc: &'a Html) -> Result<ElementRef<'a>, DecodeError> {
        let table_sel = selector(&self.options.table_selector)?;
        doc.select(&table_sel).next().ok_or(DecodeError::MissingTable)
    }

    fn page_number_from_href(&self, href: &str) -> Result<u32, DecodeError> {
        let dummy = Url::parse("http://localhost/").map_err(|e| DecodeError::Malformed(e.to_string()))?;
        let url = dummy
            .join(href.trim())
            .map_err(|_| DecodeError::PageNumber(href.to_string()))?;
        let value = url
            .query_pairs()
            .find(|(key, _)| key == self.options.page_param.as_str())
            .map(|(_, value)| value.into_owned())
            .ok_or_else(|| DecodeError::PageNumber(href.to_string()))?;
        value
            .trim()
            .parse::<u32>()
            .map_err(|_| DecodeError::PageNumber(href.to_string()))
    }
}

impl PageSource for HtmlSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Html
    }

    fn page_request(&self, index: &IndexDescriptor, page: u32) -> Result<FetchRequest, HarvestError> {
        let search = index
            .search
            .as_ref()
            .ok_or_else(|| HarvestError::MissingSearchUrl {
                title: index.title.clone(),
            })?;
        let page = page.max(1);
        let value = if self.options.zero_based_pages {
            page - 1
        } else {
            page
        };
        Ok(FetchRequest::get(search.base.clone())
            .with_query(search.params_with(&self.options.page_param, &value.to_string()))
            .with_namespace(index.cache_namespace()))
    }

    fn total_pages(&self, response: &FetchResponse) -> Result<u32, DecodeError> {
        let doc = Html::parse_document(&response.text());
        // A page without results is a glitch, not a one-page index.
        self.results_table(&doc)?;

        for raw in &self.options.last_page_selectors {
            let sel = selector(raw)?;
            let href = doc
                .select(&sel)
                .find_map(|link| link.value().attr("href"));
            if let Some(href) = href {
                let last = self.page_number_from_href(href)?;
                if !self.options.zero_based_pages {
                    return Ok(last.max(1));
                }
                return last
                    .checked_add(1)
                    .ok_or_else(|| DecodeError::PageNumber(href.to_string()));
            }
        }
        Ok(1)
    }

    fn decode_page(
        &self,
        response: &FetchResponse,
        known_headers: Option<&[String]>,
    ) -> Result<PageResult, DecodeError> {
        let doc = Html::parse_document(&response.text());
        let table = self.results_table(&doc)?;

        let headers = match known_headers {
            Some(headers) => headers.to_vec(),
            None => extract_headers(table)?,
        };

        let base = self.link_base(response);
        let row_sel = selector("tr")?;
        let cell_sel = selector("td")?;
        let link_sel = selector("a[href]")?;

        let mut rows = Vec::new();
        for tr in table.select(&row_sel) {
            let mut record = Record::new();
            for (cell, header) in tr.select(&cell_sel).zip(headers.iter()) {
                let text = clean_text(&cell.text().collect::<String>());
                record.insert(header.clone(), text);
                let link = cell
                    .select(&link_sel)
                    .filter_map(|a| a.value().attr("href"))
                    .find_map(|href| resolve_link(href, base.as_ref(), &self.options.ignored_links));
                if let Some(url) = link {
                    record.insert(url_column(header), url.to_string());
                }
            }
            if !record.is_empty() {
                rows.push(record);
            }
        }

        Ok(PageResult { headers, rows })
    }

    fn artifact_name<'a>(&self, index: &'a IndexDescriptor) -> &'a str {
        &index.title
    }

    fn clears_cache_after_write(&self) -> bool {
        true
    }
}

fn extract_headers(table: ElementRef<'_>) -> Result<Vec<String>, DecodeError> {
    let head_sel = selector("thead th")?;
    let mut labels: Vec<String> = table
        .select(&head_sel)
        .map(|th| th.text().collect::<String>())
        .collect();
    if labels.is_empty() {
        let row_sel = selector("tr")?;
        let th_sel = selector("th")?;
        if let Some(first) = table.select(&row_sel).next() {
            labels = first.select(&th_sel).map(|th| th.text().collect()).collect();
        }
    }
    Ok(normalize_headers(labels.into_iter().map(Some)))
}

fn selector(raw: &str) -> Result<Selector, DecodeError> {
    Selector::parse(raw).map_err(|_| DecodeError::InvalidSelector(raw.to_string()))
}

