//! Harvest engine: HTTP fetching, page decoding and effect execution.
mod cache;
mod catalog;
mod decode;
mod fetch;
mod filename;
mod graphql;
mod harvester;
mod html;
mod links;
mod orchestrator;
mod pagination;
mod persist;
mod progress;
mod retry;
mod source;
mod types;

pub use cache::ResponseCache;
pub use catalog::{descriptor_from_row, load_catalog, CatalogError, CatalogRow};
pub use decode::{decode_body, DecodeError};
pub use fetch::{
    CacheFilter, FetchRequest, FetchResponse, FetchSettings, Fetcher, Method, ReqwestFetcher,
    RequestBody,
};
pub use filename::{csv_filename, slugify};
pub use graphql::{GraphQlOptions, GraphQlSource, DEFAULT_QUERY};
pub use harvester::IndexHarvester;
pub use html::{HtmlOptions, HtmlSource};
pub use links::{resolve_link, site_origin};
pub use orchestrator::run_all;
pub use pagination::{HarvestSettings, PaginationDriver, SoftFailurePredicate};
pub use persist::{encode_csv, ensure_output_dir, AtomicFileWriter, PersistError};
pub use progress::{ChannelProgressSink, LogProgressSink, NoopProgressSink, ProgressSink};
pub use retry::{duration_millis, RetryPolicy};
pub use source::{PageSource, SourceKind, DETAILS_LABEL};
pub use types::{
    FailureKind, FetchError, HarvestError, HarvestEvent, IndexDescriptor, IndexReport,
    RunSummary, SearchUrl,
};
