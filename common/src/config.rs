use serde::{Deserialize, Serialize};

/// Cadences for the control loop's independent timers. Each fires at most
/// once per period; missed intervals are never coalesced or caught up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingConfig {
    pub tick_interval_ms: u64,
    pub schedule_sync_interval_ms: u64,
    pub command_poll_interval_ms: u64,
    pub heartbeat_interval_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1_000,
            schedule_sync_interval_ms: 300_000,
            command_poll_interval_ms: 5_000,
            heartbeat_interval_ms: 60_000,
        }
    }
}

impl TimingConfig {
    pub fn sanitize(&mut self) {
        // A sub-second tick gains nothing at minute resolution, and a poll
        // faster than a second would hammer the backend.
        self.tick_interval_ms = self.tick_interval_ms.max(250);
        self.command_poll_interval_ms = self.command_poll_interval_ms.max(1_000);
        self.schedule_sync_interval_ms = self.schedule_sync_interval_ms.max(10_000);
        self.heartbeat_interval_ms = self.heartbeat_interval_ms.max(10_000);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BackendConfig {
    pub base_url: String,
    pub api_key: String,
}

/// What the provisioning flow (an external collaborator) wrote for us.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionedSettings {
    pub device_name: String,
    pub school_code: String,
    pub timezone: String,
}

impl Default for ProvisionedSettings {
    fn default() -> Self {
        Self {
            device_name: "AutoBell Device".to_string(),
            school_code: String::new(),
            timezone: "Etc/UTC".to_string(),
        }
    }
}

impl ProvisionedSettings {
    pub fn sanitize(&mut self) {
        if self.device_name.trim().is_empty() {
            self.device_name = ProvisionedSettings::default().device_name;
        }
        if self.timezone.trim().is_empty() {
            self.timezone = ProvisionedSettings::default().timezone;
        }
    }
}

/// The persisted configuration document (`runtime.json` in the data dir).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub settings: ProvisionedSettings,
}

impl RuntimeConfig {
    pub fn sanitize(&mut self) {
        self.timing.sanitize();
        self.settings.sanitize();
    }
}
