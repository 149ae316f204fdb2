//! File-backed job store.
//!
//! Each job lives in its own JSON record at `<root>/jobs/<job_id>.json`.
//! Records are written to a temporary file in the same directory, synced,
//! and renamed over the target, so readers only ever see complete records.
//! Read-modify-write cycles on one id are serialized by a per-record lock;
//! across processes the rename gives last-writer-wins.

use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::debug;

use crate::error::{RelayError, Result};
use crate::state_machine::{BatchJob, JobStatus, ProviderFields};

const JOBS_DIR: &str = "jobs";
const RECORD_EXT: &str = "json";
const MAX_JOB_ID_LEN: usize = 128;

/// Checks that a job id is usable as a record file name.
pub fn validate_job_id(job_id: &str) -> Result<()> {
    if job_id.is_empty() {
        return Err(RelayError::Validation("job id must not be empty".into()));
    }
    if job_id.len() > MAX_JOB_ID_LEN {
        return Err(RelayError::Validation(format!(
            "job id longer than {MAX_JOB_ID_LEN} characters"
        )));
    }
    if job_id.starts_with('.') {
        return Err(RelayError::Validation(format!(
            "job id {job_id:?} must not start with '.'"
        )));
    }
    if let Some(bad) = job_id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(RelayError::Validation(format!(
            "job id {job_id:?} contains invalid character {bad:?}"
        )));
    }
    Ok(())
}

pub struct JobStore {
    root: PathBuf,
    jobs_dir: PathBuf,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl JobStore {
    /// Opens (creating if needed) a store under `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let jobs_dir = root.join(JOBS_DIR);
        fs::create_dir_all(&jobs_dir)?;
        Ok(Self {
            root,
            jobs_dir,
            locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, job_id: &str) -> PathBuf {
        self.jobs_dir.join(format!("{job_id}.{RECORD_EXT}"))
    }

    fn lock_for(&self, job_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        locks.entry(job_id.to_string()).or_default().clone()
    }

    // Drops the map entry once no other caller holds or waits on it.
    fn release_lock(&self, job_id: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        drop(lock);
        if locks.get(job_id).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(job_id);
        }
    }

    /// Creates or overwrites the record for `job.job_id`.
    pub fn put(&self, job: &BatchJob) -> Result<()> {
        validate_job_id(&job.job_id)?;
        self.write_record(job, true)
    }

    /// Writes a new record, failing with [`RelayError::DuplicateJobId`] if one
    /// already exists. The existence check and the write are a single atomic
    /// no-clobber rename.
    pub fn create(&self, job: &BatchJob) -> Result<()> {
        validate_job_id(&job.job_id)?;
        self.write_record(job, false)
    }

    /// Loads a record. An id that could never name a record is reported as
    /// [`RelayError::JobNotFound`].
    pub fn get(&self, job_id: &str) -> Result<BatchJob> {
        if validate_job_id(job_id).is_err() {
            return Err(RelayError::JobNotFound(job_id.to_string()));
        }
        let path = self.record_path(job_id);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(RelayError::JobNotFound(job_id.to_string()));
            }
            Err(e) if e.kind() == ErrorKind::InvalidData => {
                return Err(RelayError::CorruptRecord {
                    job_id: job_id.to_string(),
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let job: BatchJob =
            serde_json::from_str(&text).map_err(|e| RelayError::CorruptRecord {
                job_id: job_id.to_string(),
                reason: e.to_string(),
            })?;
        if job.job_id != job_id {
            return Err(RelayError::CorruptRecord {
                job_id: job_id.to_string(),
                reason: format!("record holds job id {:?}", job.job_id),
            });
        }
        Ok(job)
    }

    pub fn exists(&self, job_id: &str) -> bool {
        validate_job_id(job_id).is_ok() && self.record_path(job_id).is_file()
    }

    /// Ids of all persisted jobs, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.jobs_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXT) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if validate_job_id(stem).is_ok() {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Sets the status and any provided provider fields of a stored job.
    pub fn update_status(
        &self,
        job_id: &str,
        status: JobStatus,
        fields: ProviderFields,
    ) -> Result<BatchJob> {
        self.update(job_id, |job| {
            job.status = status;
            fields.apply_to(job);
        })
    }

    /// Loads, mutates and rewrites one record under its lock.
    ///
    /// Rejects mutations of write-once fields.
    pub fn update<F>(&self, job_id: &str, mutate: F) -> Result<BatchJob>
    where
        F: FnOnce(&mut BatchJob),
    {
        let lock = self.lock_for(job_id);
        let result = {
            let _guard = lock.lock().unwrap_or_else(|p| p.into_inner());
            self.update_locked(job_id, mutate)
        };
        self.release_lock(job_id, lock);
        result
    }

    fn update_locked<F>(&self, job_id: &str, mutate: F) -> Result<BatchJob>
    where
        F: FnOnce(&mut BatchJob),
    {
        let current = self.get(job_id)?;
        let mut next = current.clone();
        mutate(&mut next);
        if !current.same_identity(&next) {
            return Err(RelayError::Validation(format!(
                "update to job {job_id} would change write-once fields"
            )));
        }
        next.updated_at = Utc::now();
        self.write_record(&next, true)?;
        debug!(job_id, status = %next.status, "updated job record");
        Ok(next)
    }

    fn write_record(&self, job: &BatchJob, overwrite: bool) -> Result<()> {
        let body = serde_json::to_vec_pretty(job).map_err(std::io::Error::other)?;

        let mut tmp = tempfile::Builder::new()
            .prefix(".")
            .suffix(".part")
            .tempfile_in(&self.jobs_dir)?;
        tmp.write_all(&body)?;
        tmp.as_file().sync_all()?;

        let target = self.record_path(&job.job_id);
        if overwrite {
            tmp.persist(&target).map_err(|e| RelayError::Io(e.error))?;
        } else {
            tmp.persist_noclobber(&target).map_err(|e| {
                if e.error.kind() == ErrorKind::AlreadyExists {
                    RelayError::DuplicateJobId(job.job_id.clone())
                } else {
                    RelayError::Io(e.error)
                }
            })?;
        }
        debug!(job_id = %job.job_id, path = %target.display(), "wrote job record");
        Ok(())
    }
}

impl std::fmt::Debug for JobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobStore").field("root", &self.root).finish()
    }
}
