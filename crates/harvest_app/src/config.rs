//! `harvest.ron` configuration.
//!
//! Every field has a default, so a config file only needs the values it
//! changes. Command-line flags are applied on top through [`Overrides`].

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use harvest_engine::{
    duration_millis, FetchSettings, GraphQlOptions, HarvestSettings, HtmlOptions, RetryPolicy,
    SourceKind,
};
use harvest_logging::harvest_info;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_FILE: &str = "harvest.ron";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    pub source: SourceKind,
    pub catalog: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub cache_enabled: bool,
    #[serde(with = "duration_millis")]
    pub connect_timeout: Duration,
    #[serde(with = "duration_millis")]
    pub request_timeout: Duration,
    pub user_agent: Option<String>,
    pub max_response_bytes: u64,
    pub retry: RetryPolicy,
    #[serde(with = "duration_millis")]
    pub polite_delay: Duration,
    #[serde(with = "duration_millis")]
    pub soft_failure_backoff: Duration,
    pub max_soft_retries: Option<u32>,
    /// Base for relative links, shared by both sources unless they set their own.
    pub site_base: Option<String>,
    pub html: HtmlOptions,
    pub graphql: GraphQlOptions,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        let fetch = FetchSettings::default();
        let harvest = HarvestSettings::default();
        Self {
            source: SourceKind::default(),
            catalog: None,
            output_dir: PathBuf::from("output"),
            cache_dir: PathBuf::from(".harvest_cache"),
            cache_enabled: true,
            connect_timeout: fetch.connect_timeout,
            request_timeout: fetch.request_timeout,
            user_agent: None,
            max_response_bytes: fetch.max_bytes,
            retry: fetch.retry,
            polite_delay: harvest.polite_delay,
            soft_failure_backoff: harvest.soft_failure_backoff,
            max_soft_retries: harvest.max_soft_retries,
            site_base: None,
            html: HtmlOptions::default(),
            graphql: GraphQlOptions::default(),
        }
    }
}

/// Command-line values that replace their config counterparts when present.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub source: Option<SourceKind>,
    pub catalog: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub max_soft_retries: Option<u32>,
    pub no_cache: bool,
}

impl HarvestConfig {
    pub fn from_ron(text: &str) -> Result<Self> {
        Ok(ron::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_ron(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    /// An explicit path must exist; otherwise `harvest.ron` is used if present.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.is_file() {
                    harvest_info!("using {}", default.display());
                    Self::load(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(source) = overrides.source {
            self.source = source;
        }
        if let Some(catalog) = overrides.catalog {
            self.catalog = Some(catalog);
        }
        if let Some(output_dir) = overrides.output_dir {
            self.output_dir = output_dir;
        }
        if overrides.max_soft_retries.is_some() {
            self.max_soft_retries = overrides.max_soft_retries;
        }
        if overrides.no_cache {
            self.cache_enabled = false;
        }
    }

    pub fn fetch_settings(&self) -> FetchSettings {
        let defaults = FetchSettings::default();
        FetchSettings {
            connect_timeout: self.connect_timeout,
            request_timeout: self.request_timeout,
            max_bytes: self.max_response_bytes,
            user_agent: self.user_agent.clone().unwrap_or(defaults.user_agent),
            retry: self.retry.clone(),
        }
    }

    pub fn harvest_settings(&self) -> HarvestSettings {
        HarvestSettings {
            polite_delay: self.polite_delay,
            soft_failure_backoff: self.soft_failure_backoff,
            max_soft_retries: self.max_soft_retries,
            ..HarvestSettings::default()
        }
    }

    pub fn html_options(&self) -> HtmlOptions {
        let mut options = self.html.clone();
        if options.site_base.is_none() {
            options.site_base = self.site_base.clone();
        }
        options
    }

    pub fn graphql_options(&self) -> GraphQlOptions {
        let mut options = self.graphql.clone();
        if options.site_base.is_none() {
            options.site_base = self.site_base.clone();
        }
        options
    }
}
