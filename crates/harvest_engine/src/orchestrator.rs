use std::path::Path;

use harvest_logging::harvest_info;

use crate::harvester::IndexHarvester;
use crate::{HarvestError, HarvestEvent, IndexDescriptor, RunSummary};

/// Harvests `catalog[start_index..]` in order.
///
/// The first unrecovered error stops the run and is returned unchanged; the
/// indexes before it keep their artifacts. A `start_index` past the end
/// harvests nothing.
pub async fn run_all(
    harvester: &IndexHarvester,
    catalog: &[IndexDescriptor],
    start_index: usize,
    output_dir: &Path,
) -> Result<RunSummary, HarvestError> {
    let total = catalog.len();
    let mut summary = RunSummary {
        start_index,
        next_index: start_index,
        reports: Vec::new(),
    };
    if start_index >= total {
        harvest_info!("nothing to harvest: start {} of {} index(es)", start_index, total);
        return Ok(summary);
    }

    for (position, index) in catalog.iter().enumerate().skip(start_index) {
        harvester.sink().emit(HarvestEvent::IndexStarted {
            position,
            total,
            title: index.title.clone(),
        });
        let report = harvester.run(index, output_dir).await?;
        harvester.sink().emit(HarvestEvent::IndexCompleted {
            position,
            report: report.clone(),
        });
        summary.reports.push(report);
        summary.next_index = position + 1;
    }
    Ok(summary)
}
