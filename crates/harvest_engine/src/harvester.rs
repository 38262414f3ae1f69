use std::path::Path;
use std::sync::Arc;

use harvest_logging::{harvest_debug, harvest_info, index_scope};

use crate::fetch::Fetcher;
use crate::filename::csv_filename;
use crate::pagination::{HarvestSettings, PaginationDriver};
use crate::persist::{ensure_output_dir, AtomicFileWriter};
use crate::progress::{NoopProgressSink, ProgressSink};
use crate::source::PageSource;
use crate::{HarvestError, IndexDescriptor, IndexReport};

/// Harvests one index end to end and writes its CSV artifact.
pub struct IndexHarvester {
    fetcher: Arc<dyn Fetcher>,
    source: Arc<dyn PageSource>,
    settings: HarvestSettings,
    sink: Arc<dyn ProgressSink>,
}

impl IndexHarvester {
    pub fn new(fetcher: Arc<dyn Fetcher>, source: Arc<dyn PageSource>, settings: HarvestSettings) -> Self {
        Self {
            fetcher,
            source,
            settings,
            sink: Arc::new(NoopProgressSink),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn source(&self) -> &dyn PageSource {
        self.source.as_ref()
    }

    pub(crate) fn sink(&self) -> &dyn ProgressSink {
        self.sink.as_ref()
    }

    pub async fn run(&self, index: &IndexDescriptor, output_dir: &Path) -> Result<IndexReport, HarvestError> {
        self.run_from_page(index, 1, output_dir).await
    }

    /// Like [`run`](Self::run), skipping the pages before `start_page`.
    pub async fn run_from_page(
        &self,
        index: &IndexDescriptor,
        start_page: u32,
        output_dir: &Path,
    ) -> Result<IndexReport, HarvestError> {
        let _scope = index_scope(&index.cache_namespace());
        ensure_output_dir(output_dir)?;

        let driver = PaginationDriver::new(
            Arc::clone(&self.fetcher),
            Arc::clone(&self.source),
            self.settings.clone(),
        )
        .with_sink(Arc::clone(&self.sink));
        let accumulator = driver.harvest_index(index, start_page).await?;

        let pages = accumulator.page_count();
        let table = accumulator.into_table();
        let filename = csv_filename(self.source.artifact_name(index));
        let path = AtomicFileWriter::new(output_dir.to_path_buf()).write_csv(&filename, &table)?;
        harvest_info!(
            "wrote {} row(s) x {} column(s) to {}",
            table.rows.len(),
            table.columns.len(),
            path.display()
        );

        if self.source.clears_cache_after_write() {
            harvest_debug!("clearing cache namespace {}", index.cache_namespace());
            self.fetcher.clear_namespace(&index.cache_namespace())?;
        }

        Ok(IndexReport {
            title: index.title.clone(),
            path,
            pages,
            rows_written: table.rows.len(),
            columns: table.columns,
        })
    }
}
