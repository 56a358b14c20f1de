//! On-disk persistence for the runtime configuration and the cached
//! schedule document. The cache is what keeps bells ringing through a
//! backend outage, so schedule loads are strict: a corrupt file surfaces
//! as an error instead of silently emptying the schedule.

use std::io::ErrorKind;
use std::path::PathBuf;

use autobell_common::{RuntimeConfig, ScheduleDocument, SyncError};

pub struct ScheduleStore {
    runtime_path: PathBuf,
    schedule_path: PathBuf,
}

impl ScheduleStore {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            runtime_path: data_dir.join("runtime.json"),
            schedule_path: data_dir.join("schedule.json"),
        }
    }

    pub async fn load_runtime(&self) -> Result<RuntimeConfig, SyncError> {
        match tokio::fs::read(&self.runtime_path).await {
            Ok(raw) => {
                serde_json::from_slice(&raw).map_err(|err| SyncError::Storage(err.to_string()))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
            Err(err) => Err(SyncError::Storage(err.to_string())),
        }
    }

    pub async fn save_runtime(&self, runtime: &RuntimeConfig) -> Result<(), SyncError> {
        self.write_json(&self.runtime_path, runtime).await
    }

    pub async fn load_schedule(&self) -> Result<ScheduleDocument, SyncError> {
        let raw = tokio::fs::read(&self.schedule_path)
            .await
            .map_err(|err| SyncError::Storage(err.to_string()))?;
        serde_json::from_slice(&raw).map_err(|err| SyncError::Storage(err.to_string()))
    }

    pub async fn save_schedule(&self, document: &ScheduleDocument) -> Result<(), SyncError> {
        self.write_json(&self.schedule_path, document).await
    }

    async fn write_json<T: serde::Serialize>(
        &self,
        path: &PathBuf,
        value: &T,
    ) -> Result<(), SyncError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| SyncError::Storage(err.to_string()))?;
        }
        let payload =
            serde_json::to_vec_pretty(value).map_err(|err| SyncError::Storage(err.to_string()))?;
        tokio::fs::write(path, payload)
            .await
            .map_err(|err| SyncError::Storage(err.to_string()))?;
        Ok(())
    }
}
