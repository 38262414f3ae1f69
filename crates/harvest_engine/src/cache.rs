//! Content-addressed on-disk response cache.
//!
//! Layout: `{root}/{namespace}/{signature}.json` holds the status line data and
//! `{signature}.body` the raw bytes. Requests without a namespace share
//! `{root}/shared`. Both files are written atomically, body first, so a
//! metadata file always points at a complete body.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use harvest_logging::harvest_warn;
use serde::{Deserialize, Serialize};

use crate::fetch::{FetchRequest, FetchResponse};
use crate::filename::slugify;
use crate::persist::AtomicFileWriter;
use crate::{FailureKind, FetchError};

const SHARED_NAMESPACE: &str = "shared";

#[derive(Debug, Serialize, Deserialize)]
struct CachedMeta {
    url: String,
    status: u16,
    content_type: Option<String>,
    final_url: String,
}

#[derive(Debug, Clone)]
pub struct ResponseCache {
    root: PathBuf,
}

impl ResponseCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn namespace_dir(&self, namespace: Option<&str>) -> PathBuf {
        match namespace {
            Some(ns) => self.root.join(slugify(ns)),
            None => self.root.join(SHARED_NAMESPACE),
        }
    }

    fn entry_paths(&self, request: &FetchRequest) -> (PathBuf, PathBuf, String) {
        let dir = self.namespace_dir(request.cache_namespace.as_deref());
        let signature = request.signature();
        (
            dir.join(format!("{signature}.json")),
            dir.join(format!("{signature}.body")),
            signature,
        )
    }

    /// Returns the cached response for `request`, marked `from_cache`.
    /// Unreadable entries count as misses.
    pub fn load(&self, request: &FetchRequest) -> Result<Option<FetchResponse>, FetchError> {
        let (meta_path, body_path, _) = self.entry_paths(request);
        let meta_text = match fs::read_to_string(&meta_path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(cache_error(&meta_path, err)),
        };
        let meta: CachedMeta = match serde_json::from_str(&meta_text) {
            Ok(meta) => meta,
            Err(err) => {
                harvest_warn!("ignoring corrupt cache entry {:?}: {}", meta_path, err);
                return Ok(None);
            }
        };
        let body = match fs::read(&body_path) {
            Ok(body) => body,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(cache_error(&body_path, err)),
        };
        Ok(Some(FetchResponse {
            status: meta.status,
            body,
            content_type: meta.content_type,
            final_url: meta.final_url,
            from_cache: true,
        }))
    }

    pub fn store(&self, request: &FetchRequest, response: &FetchResponse) -> Result<(), FetchError> {
        let (meta_path, _, signature) = self.entry_paths(request);
        let dir = meta_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        let meta = CachedMeta {
            url: request.url.clone(),
            status: response.status,
            content_type: response.content_type.clone(),
            final_url: response.final_url.clone(),
        };
        let meta_json = serde_json::to_string(&meta)
            .map_err(|err| FetchError::new(FailureKind::Cache, err.to_string()))?;

        let writer = AtomicFileWriter::new(dir);
        writer
            .write(&format!("{signature}.body"), &response.body)
            .and_then(|_| writer.write(&format!("{signature}.json"), meta_json))
            .map_err(|err| FetchError::new(FailureKind::Cache, err.to_string()))?;
        Ok(())
    }

    pub fn evict(&self, request: &FetchRequest) -> Result<(), FetchError> {
        let (meta_path, body_path, _) = self.entry_paths(request);
        remove_if_exists(&meta_path)?;
        remove_if_exists(&body_path)
    }

    pub fn clear_namespace(&self, namespace: &str) -> Result<(), FetchError> {
        remove_dir_if_exists(&self.namespace_dir(Some(namespace)))
    }

    pub fn clear_all(&self) -> Result<(), FetchError> {
        remove_dir_if_exists(&self.root)
    }
}

fn remove_if_exists(path: &Path) -> Result<(), FetchError> {
    match fs::remove_file(path) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => Err(cache_error(path, err)),
        _ => Ok(()),
    }
}

fn remove_dir_if_exists(path: &Path) -> Result<(), FetchError> {
    match fs::remove_dir_all(path) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => Err(cache_error(path, err)),
        _ => Ok(()),
    }
}

fn cache_error(path: &Path, err: io::Error) -> FetchError {
    FetchError::new(FailureKind::Cache, format!("{}: {}", path.display(), err))
}
