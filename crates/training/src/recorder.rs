//! Experiment tracking on the local filesystem.
//!
//! A run is opened with [`RunRecorder::begin_run`] once training and
//! evaluation have finished, fed metrics and artifact files, and closed with
//! [`RunRecorder::end_run`]. The filesystem recorder lays runs out as
//! `<root>/<experiment>/<run-id>/run.json` with copied artifacts beside the
//! metadata, so a run directory is self-contained and survives the process.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RunRecorderError {
    #[error("recorder io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("run metadata error at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type RunRecorderResult<T> = Result<T, RunRecorderError>;

/// Ticket for one open run, handed back by `begin_run` and consumed by
/// `end_run`.
#[derive(Debug, Clone)]
pub struct RunHandle {
    pub id: String,
    pub experiment: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
}

#[derive(Debug, Serialize, Deserialize)]
struct RunMetadata {
    id: String,
    experiment: String,
    status: RunStatus,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    metrics: BTreeMap<String, f64>,
    artifacts: Vec<String>,
}

/// Sink for finished-run bookkeeping.
pub trait RunRecorder {
    /// Open a run under the named experiment.
    fn begin_run(&mut self, experiment: &str) -> RunRecorderResult<RunHandle>;

    /// Record a final scalar metric for the run.
    fn log_metric(&mut self, run: &RunHandle, name: &str, value: f64) -> RunRecorderResult<()>;

    /// Attach a copy of an artifact file to the run.
    fn log_artifact(&mut self, run: &RunHandle, file: &Path) -> RunRecorderResult<()>;

    /// Attach a copy of a model checkpoint under the given model name.
    fn log_model(&mut self, run: &RunHandle, model_file: &Path, name: &str)
        -> RunRecorderResult<()>;

    /// Close the run; the handle cannot be used afterwards.
    fn end_run(&mut self, run: RunHandle) -> RunRecorderResult<()>;
}

/// Filesystem-backed recorder.
#[derive(Debug, Clone)]
pub struct FsRunRecorder {
    root: PathBuf,
}

impl FsRunRecorder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn run_dir(&self, run: &RunHandle) -> PathBuf {
        self.root.join(&run.experiment).join(&run.id)
    }

    fn metadata_path(&self, run: &RunHandle) -> PathBuf {
        self.run_dir(run).join("run.json")
    }

    fn read_metadata(&self, run: &RunHandle) -> RunRecorderResult<RunMetadata> {
        let path = self.metadata_path(run);
        let text = fs::read_to_string(&path).map_err(|source| RunRecorderError::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| RunRecorderError::Json { path, source })
    }

    fn write_metadata(&self, run: &RunHandle, meta: &RunMetadata) -> RunRecorderResult<()> {
        let path = self.metadata_path(run);
        let text = serde_json::to_string_pretty(meta).map_err(|source| RunRecorderError::Json {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, text).map_err(|source| RunRecorderError::Io { path, source })
    }

    fn copy_into(
        &self,
        run: &RunHandle,
        file: &Path,
        subdir: &Path,
        label: &str,
    ) -> RunRecorderResult<()> {
        let file_name = file.file_name().ok_or_else(|| RunRecorderError::Io {
            path: file.to_path_buf(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "artifact path has no file name"),
        })?;
        let dest_dir = self.run_dir(run).join(subdir);
        fs::create_dir_all(&dest_dir).map_err(|source| RunRecorderError::Io {
            path: dest_dir.clone(),
            source,
        })?;
        let dest = dest_dir.join(file_name);
        fs::copy(file, &dest).map_err(|source| RunRecorderError::Io {
            path: file.to_path_buf(),
            source,
        })?;

        let mut meta = self.read_metadata(run)?;
        meta.artifacts.push(label.to_string());
        self.write_metadata(run, &meta)
    }
}

impl RunRecorder for FsRunRecorder {
    fn begin_run(&mut self, experiment: &str) -> RunRecorderResult<RunHandle> {
        let run = RunHandle {
            id: Uuid::new_v4().to_string(),
            experiment: experiment.to_string(),
            started_at: Utc::now(),
        };
        let dir = self.run_dir(&run);
        fs::create_dir_all(&dir).map_err(|source| RunRecorderError::Io {
            path: dir.clone(),
            source,
        })?;
        let meta = RunMetadata {
            id: run.id.clone(),
            experiment: run.experiment.clone(),
            status: RunStatus::Running,
            started_at: run.started_at,
            ended_at: None,
            metrics: BTreeMap::new(),
            artifacts: Vec::new(),
        };
        self.write_metadata(&run, &meta)?;
        Ok(run)
    }

    fn log_metric(&mut self, run: &RunHandle, name: &str, value: f64) -> RunRecorderResult<()> {
        let mut meta = self.read_metadata(run)?;
        meta.metrics.insert(name.to_string(), value);
        self.write_metadata(run, &meta)
    }

    fn log_artifact(&mut self, run: &RunHandle, file: &Path) -> RunRecorderResult<()> {
        let label = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.copy_into(run, file, Path::new("artifacts"), &format!("artifacts/{label}"))
    }

    fn log_model(
        &mut self,
        run: &RunHandle,
        model_file: &Path,
        name: &str,
    ) -> RunRecorderResult<()> {
        let subdir = Path::new("artifacts").join("models").join(name);
        let label = model_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.copy_into(
            run,
            model_file,
            &subdir,
            &format!("artifacts/models/{name}/{label}"),
        )
    }

    fn end_run(&mut self, run: RunHandle) -> RunRecorderResult<()> {
        let mut meta = self.read_metadata(&run)?;
        meta.status = RunStatus::Completed;
        meta.ended_at = Some(Utc::now());
        self.write_metadata(&run, &meta)
    }
}

/// Recorder that drops everything, for runs that should leave no trace.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRecorder;

impl RunRecorder for NoopRecorder {
    fn begin_run(&mut self, experiment: &str) -> RunRecorderResult<RunHandle> {
        Ok(RunHandle {
            id: Uuid::new_v4().to_string(),
            experiment: experiment.to_string(),
            started_at: Utc::now(),
        })
    }

    fn log_metric(&mut self, _run: &RunHandle, _name: &str, _value: f64) -> RunRecorderResult<()> {
        Ok(())
    }

    fn log_artifact(&mut self, _run: &RunHandle, _file: &Path) -> RunRecorderResult<()> {
        Ok(())
    }

    fn log_model(
        &mut self,
        _run: &RunHandle,
        _model_file: &Path,
        _name: &str,
    ) -> RunRecorderResult<()> {
        Ok(())
    }

    fn end_run(&mut self, _run: RunHandle) -> RunRecorderResult<()> {
        Ok(())
    }
}
