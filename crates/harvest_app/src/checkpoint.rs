//! Run checkpoint: where a catalog run stopped, so `--resume` can continue.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use harvest_engine::{
    ensure_output_dir, AtomicFileWriter, HarvestEvent, LogProgressSink, ProgressSink, SourceKind,
};
use harvest_logging::{harvest_error, harvest_info, harvest_warn};
use serde::{Deserialize, Serialize};

const CHECKPOINT_FILENAME: &str = ".harvest_checkpoint.ron";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedIndex {
    pub position: usize,
    pub title: String,
    pub artifact: String,
    pub rows: usize,
    pub finished_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Checkpoint {
    pub source: SourceKind,
    /// Catalog position to harvest next.
    pub next_index: usize,
    pub completed: Vec<CompletedIndex>,
}

impl Checkpoint {
    pub fn new(source: SourceKind, next_index: usize) -> Self {
        Self {
            source,
            next_index,
            completed: Vec::new(),
        }
    }
}

pub fn checkpoint_path(output_dir: &Path) -> PathBuf {
    output_dir.join(CHECKPOINT_FILENAME)
}

/// Reads the checkpoint in `output_dir`. Missing or unreadable files yield `None`.
pub fn load_checkpoint(output_dir: &Path) -> Option<Checkpoint> {
    let path = checkpoint_path(output_dir);
    let content = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
        Err(err) => {
            harvest_warn!("Failed to read checkpoint from {:?}: {}", path, err);
            return None;
        }
    };

    match ron::from_str(&content) {
        Ok(checkpoint) => {
            harvest_info!("Loaded checkpoint from {:?}", path);
            Some(checkpoint)
        }
        Err(err) => {
            harvest_warn!("Failed to parse checkpoint from {:?}: {}", path, err);
            None
        }
    }
}

pub fn save_checkpoint(output_dir: &Path, checkpoint: &Checkpoint) {
    if let Err(err) = ensure_output_dir(output_dir) {
        harvest_error!("Failed to ensure output dir {:?}: {}", output_dir, err);
        return;
    }

    let pretty = ron::ser::PrettyConfig::new();
    let content = match ron::ser::to_string_pretty(checkpoint, pretty) {
        Ok(text) => text,
        Err(err) => {
            harvest_error!("Failed to serialize checkpoint: {}", err);
            return;
        }
    };

    let writer = AtomicFileWriter::new(output_dir.to_path_buf());
    if let Err(err) = writer.write(CHECKPOINT_FILENAME, &content) {
        harvest_error!("Failed to write checkpoint to {:?}: {}", output_dir, err);
    }
}

/// Logs progress and records every completed index in the checkpoint file.
pub struct CheckpointSink {
    output_dir: PathBuf,
    checkpoint: Mutex<Checkpoint>,
    log: LogProgressSink,
}

impl CheckpointSink {
    pub fn new(output_dir: PathBuf, checkpoint: Checkpoint) -> Self {
        Self {
            output_dir,
            checkpoint: Mutex::new(checkpoint),
            log: LogProgressSink,
        }
    }

    pub fn snapshot(&self) -> Checkpoint {
        match self.checkpoint.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl ProgressSink for CheckpointSink {
    fn emit(&self, event: HarvestEvent) {
        if let HarvestEvent::IndexCompleted { position, report } = &event {
            let mut checkpoint = match self.checkpoint.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            checkpoint.next_index = position + 1;
            checkpoint.completed.retain(|done| done.position != *position);
            checkpoint.completed.push(CompletedIndex {
                position: *position,
                title: report.title.clone(),
                artifact: report
                    .path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                rows: report.rows_written,
                finished_at: chrono::Utc::now().to_rfc3339(),
            });
            save_checkpoint(&self.output_dir, &checkpoint);
        }
        self.log.emit(event);
    }
}
