use std::sync::mpsc;

use harvest_logging::{harvest_info, harvest_warn};

use crate::HarvestEvent;

/// Receiver of harvest progress. Implementations must not block for long;
/// they are called inline from the harvest loop.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: HarvestEvent);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgressSink;

impl ProgressSink for NoopProgressSink {
    fn emit(&self, _event: HarvestEvent) {}
}

/// Forwards events over a channel; a dropped receiver is ignored.
pub struct ChannelProgressSink {
    tx: mpsc::Sender<HarvestEvent>,
}

impl ChannelProgressSink {
    pub fn new(tx: mpsc::Sender<HarvestEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelProgressSink {
    fn emit(&self, event: HarvestEvent) {
        let _ = self.tx.send(event);
    }
}

/// Writes one log line per event.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgressSink;

impl ProgressSink for LogProgressSink {
    fn emit(&self, event: HarvestEvent) {
        match event {
            HarvestEvent::IndexStarted {
                position,
                total,
                title,
            } => harvest_info!("index {}/{}: {}", position + 1, total, title),
            HarvestEvent::PagesDiscovered { title, total_pages } => {
                harvest_info!("{} has {} page(s)", title, total_pages)
            }
            HarvestEvent::PageHarvested {
                page,
                total_pages,
                rows,
                from_cache,
            } => harvest_info!(
                "page {}/{}: {} row(s){}",
                page,
                total_pages,
                rows,
                if from_cache { " (cached)" } else { "" }
            ),
            HarvestEvent::SoftFailure {
                page,
                attempt,
                reason,
            } => harvest_warn!("page {} soft failure #{}: {}", page, attempt, reason),
            HarvestEvent::IndexCompleted { position, report } => harvest_info!(
                "index {} done: {} row(s), {} column(s) -> {}",
                position + 1,
                report.rows_written,
                report.columns.len(),
                report.path.display()
            ),
        }
    }
}
