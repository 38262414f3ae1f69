use crate::view_model::PaginationView;
use crate::{HarvestAccumulator, PageResult};

/// Which step a soft-failure backoff returns to once the pause is over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resume {
    Discovering,
    Fetching,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Discovering,
    Fetching,
    SoftErrorBackoff { resume: Resume },
    Done,
    Failed,
}

/// Progress of one index through its pages.
///
/// `page` is 1-based and only moves forward after a page has been decoded and
/// appended, so a soft failure can neither skip nor duplicate a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationState {
    phase: Phase,
    page: u32,
    total_pages: Option<u32>,
    attempts: u32,
    max_soft_retries: Option<u32>,
    last_soft_failure: Option<String>,
    accumulator: HarvestAccumulator,
}

impl PaginationState {
    /// `start_page` of 0 is treated as 1. `max_soft_retries` of `None` retries forever.
    pub fn new(start_page: u32, max_soft_retries: Option<u32>) -> Self {
        Self {
            phase: Phase::Idle,
            page: start_page.max(1),
            total_pages: None,
            attempts: 0,
            max_soft_retries,
            last_soft_failure: None,
            accumulator: HarvestAccumulator::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn total_pages(&self) -> Option<u32> {
        self.total_pages
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.phase, Phase::Done | Phase::Failed)
    }

    /// Headers learned from the first decoded page, reused for every later page.
    pub fn known_headers(&self) -> Option<&[String]> {
        self.accumulator.headers()
    }

    pub fn accumulator(&self) -> &HarvestAccumulator {
        &self.accumulator
    }

    pub fn into_accumulator(self) -> HarvestAccumulator {
        self.accumulator
    }

    pub fn view(&self) -> PaginationView {
        PaginationView {
            phase: self.phase,
            page: self.page,
            total_pages: self.total_pages,
            pages_completed: self.accumulator.page_count(),
            rows: self.accumulator.row_count(),
            attempts: self.attempts,
            last_soft_failure: self.last_soft_failure.clone(),
        }
    }

    pub(crate) fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    pub(crate) fn set_total_pages(&mut self, total: u32) {
        self.total_pages = Some(total);
        self.attempts = 0;
    }

    /// Whether the cursor is past the last page.
    pub(crate) fn past_end(&self) -> bool {
        self.total_pages.is_some_and(|total| self.page > total)
    }

    pub(crate) fn append_page(&mut self, result: PageResult) {
        self.accumulator.push_page(result);
        self.attempts = 0;
        self.last_soft_failure = None;
        self.page += 1;
    }

    /// Records a soft failure; returns `false` once the ceiling is exceeded.
    pub(crate) fn record_soft_failure(&mut self, reason: String) -> bool {
        self.attempts += 1;
        self.last_soft_failure = Some(reason);
        self.max_soft_retries
            .map_or(true, |ceiling| self.attempts <= ceiling)
    }
}
