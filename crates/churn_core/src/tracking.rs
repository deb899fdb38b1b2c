//! File-backed experiment tracking
//!
//! Layout: `<root>/<experiment-slug>/<run-id>/` holding `meta.json`,
//! `params.json`, `metrics.json` and any artifacts logged by name. Params and
//! metrics are rewritten on every log call so a crashed run still leaves its
//! partial record on disk.

use crate::errors::{ChurnError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const META_FILE: &str = "meta.json";
pub const PARAMS_FILE: &str = "params.json";
pub const METRICS_FILE: &str = "metrics.json";
pub const MODEL_ARTIFACT: &str = "model.json";
pub const FEATURE_SPEC_ARTIFACT: &str = "feature_spec.json";
pub const FEATURE_COLUMNS_ARTIFACT: &str = "feature_columns.txt";
pub const FAILED_EXPECTATIONS_ARTIFACT: &str = "failed_expectations.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Running,
    Finished,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMeta {
    pub run_id: String,
    pub experiment: String,
    pub status: RunStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

/// Directory-safe form of an experiment name: `"Telco Churn"` -> `telco-churn`
pub fn experiment_slug(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for ch in name.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-').to_string();
    if slug.is_empty() {
        "default".to_string()
    } else {
        slug
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Read a run's metadata
pub fn read_meta(run_dir: &Path) -> Result<RunMeta> {
    read_json(&run_dir.join(META_FILE))
}

/// Read a run's logged parameters
pub fn read_params(run_dir: &Path) -> Result<BTreeMap<String, serde_json::Value>> {
    read_json(&run_dir.join(PARAMS_FILE))
}

/// Read a run's logged metrics
pub fn read_metrics(run_dir: &Path) -> Result<BTreeMap<String, f64>> {
    read_json(&run_dir.join(METRICS_FILE))
}

/// Tracking store rooted at a directory
#[derive(Debug, Clone)]
pub struct FileTracker {
    root: PathBuf,
}

impl FileTracker {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn experiment_dir(&self, experiment: &str) -> PathBuf {
        self.root.join(experiment_slug(experiment))
    }

    /// Create a new run directory in `RUNNING` state
    pub fn start_run(&self, experiment: &str) -> Result<RunHandle> {
        let run_id = Uuid::new_v4().simple().to_string();
        let dir = self.experiment_dir(experiment).join(&run_id);
        fs::create_dir_all(&dir)?;

        let meta = RunMeta {
            run_id,
            experiment: experiment.to_string(),
            status: RunStatus::Running,
            start_time: Utc::now(),
            end_time: None,
        };
        let handle = RunHandle {
            dir,
            meta,
            params: BTreeMap::new(),
            metrics: BTreeMap::new(),
        };
        handle.flush()?;
        info!("Started run {} in experiment '{}'", handle.meta.run_id, experiment);
        Ok(handle)
    }

    /// All runs of an experiment, oldest first. Directories without a
    /// readable `meta.json` are skipped.
    pub fn list_runs(&self, experiment: &str) -> Result<Vec<(PathBuf, RunMeta)>> {
        let dir = self.experiment_dir(experiment);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut runs = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if !path.is_dir() {
                continue;
            }
            match read_meta(&path) {
                Ok(meta) => runs.push((path, meta)),
                Err(e) => warn!("Skipping unreadable run {}: {}", path.display(), e),
            }
        }
        runs.sort_by(|(_, a), (_, b)| {
            a.start_time
                .cmp(&b.start_time)
                .then_with(|| a.run_id.cmp(&b.run_id))
        });
        Ok(runs)
    }

    /// Most recently finished successful run of an experiment
    pub fn latest_finished_run(&self, experiment: &str) -> Result<PathBuf> {
        self.list_runs(experiment)?
            .into_iter()
            .filter(|(_, meta)| meta.status == RunStatus::Finished)
            .max_by(|(_, a), (_, b)| {
                a.end_time
                    .cmp(&b.end_time)
                    .then_with(|| a.start_time.cmp(&b.start_time))
                    .then_with(|| a.run_id.cmp(&b.run_id))
            })
            .map(|(path, _)| path)
            .ok_or_else(|| {
                ChurnError::Tracking(format!(
                    "no finished runs for experiment '{experiment}' under {}",
                    self.root.display()
                ))
            })
    }
}

/// An open run. Consumed by [`RunHandle::finish`].
#[derive(Debug)]
pub struct RunHandle {
    dir: PathBuf,
    meta: RunMeta,
    params: BTreeMap<String, serde_json::Value>,
    metrics: BTreeMap<String, f64>,
}

impl RunHandle {
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn run_id(&self) -> &str {
        &self.meta.run_id
    }

    pub fn artifact_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    pub fn log_param(&mut self, key: &str, value: impl Into<serde_json::Value>) -> Result<()> {
        self.params.insert(key.to_string(), value.into());
        write_json(&self.dir.join(PARAMS_FILE), &self.params)
    }

    pub fn log_metric(&mut self, key: &str, value: f64) -> Result<()> {
        if !value.is_finite() {
            return Err(ChurnError::Tracking(format!(
                "metric {key} is not finite: {value}"
            )));
        }
        debug!("metric {} = {}", key, value);
        self.metrics.insert(key.to_string(), value);
        write_json(&self.dir.join(METRICS_FILE), &self.metrics)
    }

    /// Write a text artifact; returns its path
    pub fn log_text(&self, name: &str, content: &str) -> Result<PathBuf> {
        let path = self.artifact_path(name);
        fs::write(&path, content)?;
        debug!("Logged artifact {}", path.display());
        Ok(path)
    }

    /// Write a pretty-printed JSON artifact; returns its path
    pub fn log_json<T: Serialize>(&self, name: &str, value: &T) -> Result<PathBuf> {
        let path = self.artifact_path(name);
        write_json(&path, value)?;
        debug!("Logged artifact {}", path.display());
        Ok(path)
    }

    /// Close the run with a terminal status
    pub fn finish(mut self, status: RunStatus) -> Result<RunMeta> {
        self.meta.status = status;
        self.meta.end_time = Some(Utc::now());
        self.flush()?;
        info!("Run {} finished with status {:?}", self.meta.run_id, status);
        Ok(self.meta)
    }

    fn flush(&self) -> Result<()> {
        write_json(&self.dir.join(META_FILE), &self.meta)?;
        write_json(&self.dir.join(PARAMS_FILE), &self.params)?;
        write_json(&self.dir.join(METRICS_FILE), &self.metrics)
    }
}
