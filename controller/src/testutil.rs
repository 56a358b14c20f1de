//! Scriptable backend and recording hardware fakes shared by the sync and
//! orchestrator tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use autobell_common::{ClockReading, SyncError};

use crate::ports::{BellActuator, FirmwareUpdater, TimeSource};
use crate::sync::{ApiRequest, ApiResponse, Backend};

/// Plays back scripted responses in order and records every request. Clones
/// share the same script and log, so a test can keep a handle after moving
/// the backend into a client.
#[derive(Clone)]
pub struct MockBackend {
    responses: Arc<Mutex<VecDeque<Result<ApiResponse, SyncError>>>>,
    requests: Arc<Mutex<Vec<ApiRequest>>>,
}

impl MockBackend {
    pub fn with_responses(responses: Vec<Result<ApiResponse, SyncError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses.into())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Backend for MockBackend {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, SyncError> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(SyncError::Network("no scripted response".to_string())))
    }
}

#[derive(Default)]
pub struct RecordingBell {
    pub rings: usize,
    pub test_rings: usize,
}

impl BellActuator for RecordingBell {
    fn ring(&mut self) {
        self.rings += 1;
    }

    fn test_ring(&mut self) {
        self.test_rings += 1;
    }
}

pub struct FixedTime {
    reading: Option<ClockReading>,
    pub resyncs: usize,
}

impl FixedTime {
    pub fn at(reading: ClockReading) -> Self {
        Self {
            reading: Some(reading),
            resyncs: 0,
        }
    }
}

impl TimeSource for FixedTime {
    fn now(&self) -> Option<ClockReading> {
        self.reading
    }

    fn force_resync(&mut self) {
        self.resyncs += 1;
    }
}

#[derive(Default)]
pub struct RecordingFirmware {
    pub applied: Vec<String>,
    pub succeed: bool,
}

impl FirmwareUpdater for RecordingFirmware {
    fn apply(&mut self, url: &str) -> bool {
        self.applied.push(url.to_string());
        self.succeed
    }
}
