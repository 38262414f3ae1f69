//! Executes the pagination state machine against a fetcher and a page source.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use harvest_core::{update, Effect, HarvestAccumulator, Msg, PaginationState, Pause};
use harvest_logging::{harvest_debug, harvest_info, harvest_trace, harvest_warn};

use crate::decode::DecodeError;
use crate::fetch::{FetchRequest, FetchResponse, Fetcher};
use crate::progress::{NoopProgressSink, ProgressSink};
use crate::source::PageSource;
use crate::{HarvestError, HarvestEvent, IndexDescriptor};

/// Decides whether a decode failure is retried after a backoff.
pub type SoftFailurePredicate = Arc<dyn Fn(&DecodeError) -> bool + Send + Sync>;

#[derive(Clone)]
pub struct HarvestSettings {
    /// Pause after each page fetched from the network.
    pub polite_delay: Duration,
    /// Pause before re-requesting a soft-failed page.
    pub soft_failure_backoff: Duration,
    /// Soft failures tolerated on one page before giving up; `None` never gives up.
    pub max_soft_retries: Option<u32>,
    pub soft_failure: SoftFailurePredicate,
}

impl HarvestSettings {
    /// No pauses at all.
    pub fn immediate() -> Self {
        Self {
            polite_delay: Duration::ZERO,
            soft_failure_backoff: Duration::ZERO,
            ..Self::default()
        }
    }

    pub fn is_soft(&self, err: &DecodeError) -> bool {
        (self.soft_failure)(err)
    }
}

impl Default for HarvestSettings {
    fn default() -> Self {
        Self {
            polite_delay: Duration::from_millis(500),
            soft_failure_backoff: Duration::from_secs(60),
            max_soft_retries: None,
            soft_failure: Arc::new(DecodeError::is_soft),
        }
    }
}

impl fmt::Debug for HarvestSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HarvestSettings")
            .field("polite_delay", &self.polite_delay)
            .field("soft_failure_backoff", &self.soft_failure_backoff)
            .field("max_soft_retries", &self.max_soft_retries)
            .finish_non_exhaustive()
    }
}

/// Drives one index through its pages.
///
/// The state machine decides what happens next; this type only performs the
/// requested fetches and pauses and feeds the outcomes back as messages.
pub struct PaginationDriver {
    fetcher: Arc<dyn Fetcher>,
    source: Arc<dyn PageSource>,
    settings: HarvestSettings,
    sink: Arc<dyn ProgressSink>,
}

impl PaginationDriver {
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

    /// Collects every page of `index` from `start_page` (0 and 1 both mean
    /// the first page) through the last one.
    pub async fn harvest_index(
        &self,
        index: &IndexDescriptor,
        start_page: u32,
    ) -> Result<HarvestAccumulator, HarvestError> {
        let mut state = PaginationState::new(start_page, self.settings.max_soft_retries);
        let mut queue: VecDeque<Effect> = VecDeque::new();
        // Discovery response, kept to serve as page 1.
        let mut prefetched: Option<FetchResponse> = None;

        let (next, effects) = update(state, Msg::Start);
        state = next;
        queue.extend(effects);

        while let Some(effect) = queue.pop_front() {
            let msg = match effect {
                Effect::DiscoverPages => {
                    Some(self.discover(index, state.attempts() + 1, &mut prefetched).await?)
                }
                Effect::FetchPage { page } => {
                    let cached = prefetched.take().filter(|_| page == 1);
                    Some(
                        self.fetch_page(
                            index,
                            page,
                            state.total_pages().unwrap_or(page),
                            state.known_headers(),
                            state.attempts() + 1,
                            cached,
                        )
                        .await?,
                    )
                }
                Effect::Pause(pause) => self.pause(pause).await,
                Effect::Finished => break,
                Effect::GiveUp { page, attempts } => {
                    return Err(HarvestError::RetriesExhausted { page, attempts });
                }
            };
            if let Some(msg) = msg {
                let (next, effects) = update(state, msg);
                state = next;
                queue.extend(effects);
                let view = state.view();
                harvest_trace!(
                    "{:?} at page {}, {} row(s)",
                    view.phase,
                    view.progress_label(),
                    view.rows
                );
            }
        }

        let accumulator = state.into_accumulator();
        harvest_debug!(
            "{} page(s), {} row(s) collected",
            accumulator.page_count(),
            accumulator.row_count()
        );
        Ok(accumulator)
    }

    async fn discover(
        &self,
        index: &IndexDescriptor,
        attempt: u32,
        prefetched: &mut Option<FetchResponse>,
    ) -> Result<Msg, HarvestError> {
        let request = self.source.page_request(index, 1)?;
        let response = self.fetcher.fetch(&request).await?;
        match self.source.total_pages(&response) {
            Ok(total_pages) => {
                harvest_info!("{} page(s) to harvest", total_pages);
                self.sink.emit(HarvestEvent::PagesDiscovered {
                    title: index.title.clone(),
                    total_pages,
                });
                *prefetched = Some(response);
                Ok(Msg::TotalPagesKnown(total_pages))
            }
            Err(err) if self.settings.is_soft(&err) => self.soft_failure(&request, 1, attempt, err),
            Err(err) => Err(err.into()),
        }
    }

    async fn fetch_page(
        &self,
        index: &IndexDescriptor,
        page: u32,
        total_pages: u32,
        known_headers: Option<&[String]>,
        attempt: u32,
        prefetched: Option<FetchResponse>,
    ) -> Result<Msg, HarvestError> {
        let request = self.source.page_request(index, page)?;
        let response = match prefetched {
            Some(response) => response,
            None => self.fetcher.fetch(&request).await?,
        };
        match self.source.decode_page(&response, known_headers) {
            Ok(result) => {
                harvest_debug!("page {}/{}: {} row(s)", page, total_pages, result.rows.len());
                self.sink.emit(HarvestEvent::PageHarvested {
                    page,
                    total_pages,
                    rows: result.rows.len(),
                    from_cache: response.from_cache,
                });
                Ok(Msg::PageDecoded {
                    page,
                    result,
                    from_cache: response.from_cache,
                })
            }
            Err(err) if self.settings.is_soft(&err) => {
                self.soft_failure(&request, page, attempt, err)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn soft_failure(
        &self,
        request: &FetchRequest,
        page: u32,
        attempt: u32,
        err: DecodeError,
    ) -> Result<Msg, HarvestError> {
        // The bad answer must not be replayed from cache on retry.
        self.fetcher.evict(request)?;
        let reason = err.to_string();
        harvest_warn!("page {} soft failure (attempt {}): {}", page, attempt, reason);
        self.sink.emit(HarvestEvent::SoftFailure {
            page,
            attempt,
            reason: reason.clone(),
        });
        Ok(Msg::SoftFailure { reason })
    }

    async fn pause(&self, pause: Pause) -> Option<Msg> {
        match pause {
            Pause::Polite => {
                sleep(self.settings.polite_delay).await;
                None
            }
            Pause::Backoff { attempt } => {
                harvest_info!(
                    "backing off {:?} before retry #{}",
                    self.settings.soft_failure_backoff,
                    attempt
                );
                sleep(self.settings.soft_failure_backoff).await;
                Some(Msg::BackoffElapsed)
            }
        }
    }
}

async fn sleep(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}
