//! Host build of the controller. Hardware ports are backed by logging
//! stand-ins so the full control loop runs on a workstation against a real
//! backend.

use std::path::PathBuf;

use chrono::Utc;
use chrono_tz::Tz;
use tracing::{info, warn};

use autobell_common::{ClockReading, DeviceIdentity, DeviceStateMachine, RuntimeConfig};

use crate::orchestrator::{LoopExit, Orchestrator};
use crate::ports::{BellActuator, FirmwareUpdater, TimeSource};
use crate::store::ScheduleStore;
use crate::sync::{HttpBackend, SyncClient};

/// Reads the OS clock in the provisioned timezone. The OS owns NTP, so a
/// forced resync is a no-op here.
struct SystemTimeSource {
    timezone: Tz,
}

impl SystemTimeSource {
    fn new(timezone: &str) -> Self {
        let timezone = timezone.parse::<Tz>().unwrap_or_else(|_| {
            warn!("unknown timezone {timezone:?}, falling back to UTC");
            Tz::UTC
        });
        Self { timezone }
    }
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Option<ClockReading> {
        Some(ClockReading::from_datetime(
            &Utc::now().with_timezone(&self.timezone),
        ))
    }

    fn force_resync(&mut self) {
        info!("time resync requested, OS clock is authoritative on host");
    }
}

struct LoggingBell;

impl BellActuator for LoggingBell {
    fn ring(&mut self) {
        info!("BELL RING");
    }

    fn test_ring(&mut self) {
        info!("BELL TEST RING");
    }
}

struct HostFirmwareUpdater;

impl FirmwareUpdater for HostFirmwareUpdater {
    fn apply(&mut self, url: &str) -> bool {
        warn!("firmware updates are only available in device builds (asked for {url})");
        false
    }
}

/// Environment overrides sit above the persisted runtime document; a set
/// variable wins, an unset one leaves the stored value alone.
fn apply_env_overrides(runtime: &mut RuntimeConfig, var: impl Fn(&str) -> Option<String>) {
    if let Some(base_url) = var("AUTOBELL_BACKEND_URL") {
        runtime.backend.base_url = base_url;
    }
    if let Some(api_key) = var("AUTOBELL_API_KEY") {
        runtime.backend.api_key = api_key;
    }
    if let Some(name) = var("AUTOBELL_DEVICE_NAME") {
        runtime.settings.device_name = name;
    }
    if let Some(code) = var("AUTOBELL_SCHOOL_CODE") {
        runtime.settings.school_code = code;
    }
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let data_dir = std::env::var("AUTOBELL_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./.autobell"));
    let store = ScheduleStore::new(data_dir);

    let mut runtime = store.load_runtime().await.unwrap_or_else(|err| {
        warn!("failed to load runtime config from store: {err}");
        RuntimeConfig::default()
    });

    apply_env_overrides(&mut runtime, |name| std::env::var(name).ok());
    runtime.sanitize();

    let mac_address =
        std::env::var("AUTOBELL_MAC").unwrap_or_else(|_| "02:00:00:00:00:01".to_string());
    let device = DeviceStateMachine::new(DeviceIdentity::new(
        mac_address.clone(),
        runtime.settings.school_code.clone(),
    ));

    info!(
        "controller starting: mac={} backend={} timezone={}",
        mac_address, runtime.backend.base_url, runtime.settings.timezone
    );

    let client = SyncClient::new(HttpBackend::new(&runtime.backend));
    let time = SystemTimeSource::new(&runtime.settings.timezone);

    let mut orchestrator = Orchestrator::new(
        runtime,
        device,
        client,
        store,
        LoggingBell,
        time,
        HostFirmwareUpdater,
    );
    orchestrator.load_cached_schedule().await;

    match orchestrator.run().await {
        LoopExit::Restart => {
            info!("control loop requested restart, exiting for supervisor");
            Ok(())
        }
    }
}
