//! Catalog loading: the CSV listing of indexes to harvest.

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::filename::slugify;
use crate::source::SourceKind;
use crate::{IndexDescriptor, SearchUrl};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("cannot read catalog {path}: {source}")]
    Read { path: String, source: csv::Error },
    #[error("catalog row {row}: {message}")]
    Row { row: usize, message: String },
}

/// One catalog line. Extra columns are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CatalogRow {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

pub fn load_catalog(path: &Path, kind: SourceKind) -> Result<Vec<IndexDescriptor>, CatalogError> {
    let read_error = |source: csv::Error| CatalogError::Read {
        path: path.display().to_string(),
        source,
    };
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(read_error)?;

    let mut descriptors = Vec::new();
    for (i, row) in reader.deserialize::<CatalogRow>().enumerate() {
        // Row 1 is the header line.
        let line = i + 2;
        let row = row.map_err(|err| CatalogError::Row {
            row: line,
            message: err.to_string(),
        })?;
        descriptors.push(descriptor_from_row(&row, kind).map_err(|message| CatalogError::Row {
            row: line,
            message,
        })?);
    }
    Ok(descriptors)
}

/// Builds the descriptor for one catalog row.
///
/// HTML: the url's query pairs become the search parameters and the `id`
/// pair is the key. GraphQL: the last non-empty path segment is the slug.
pub fn descriptor_from_row(row: &CatalogRow, kind: SourceKind) -> Result<IndexDescriptor, String> {
    let title = row.title.trim();
    if title.is_empty() {
        return Err("title is blank".into());
    }
    let raw_url = row.url.trim();
    if raw_url.is_empty() {
        return Err("url is blank".into());
    }
    let url = Url::parse(raw_url).map_err(|err| format!("invalid url {raw_url:?}: {err}"))?;
    let category = row
        .category
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string);

    let (key, search) = match kind {
        SourceKind::Html => {
            let params: Vec<(String, String)> = url
                .query_pairs()
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            let key = params
                .iter()
                .find(|(k, v)| k == "id" && !v.trim().is_empty())
                .map(|(_, v)| v.trim().to_string())
                .unwrap_or_else(|| slugify(title));
            let mut base = url.clone();
            base.set_query(None);
            base.set_fragment(None);
            (
                key,
                Some(SearchUrl {
                    base: base.to_string(),
                    params,
                }),
            )
        }
        SourceKind::GraphQl => {
            let slug = url
                .path_segments()
                .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
                .map(str::to_string)
                .ok_or_else(|| format!("no slug in url {raw_url:?}"))?;
            (slug, None)
        }
    };

    Ok(IndexDescriptor {
        title: title.to_string(),
        key,
        search,
        category,
    })
}
