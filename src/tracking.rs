/// Run summaries for experiment tracking
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Sink for end-of-run summary values (epochs run, test scores)
pub trait ExperimentTracker {
    fn set_summary(&mut self, key: &str, value: f64) -> crate::Result<()>;
}

/// Keeps the summary in memory and mirrors it to a JSON file on every update
pub struct JsonSummaryTracker {
    path: PathBuf,
    summary: BTreeMap<String, f64>,
}

impl JsonSummaryTracker {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            summary: BTreeMap::new(),
        }
    }

    pub fn summary(&self) -> &BTreeMap<String, f64> {
        &self.summary
    }
}

impl ExperimentTracker for JsonSummaryTracker {
    fn set_summary(&mut self, key: &str, value: f64) -> crate::Result<()> {
        self.summary.insert(key.to_string(), value);

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.summary)?;
        std::fs::write(&self.path, json)?;

        log::debug!("summary[{}] = {}", key, value);
        Ok(())
    }
}
