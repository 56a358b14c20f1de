//! Single-owner control loop. One task owns the state machine, the schedule
//! engine, and the sync client; every iteration reads the clock before it
//! touches the network so a slow backend can never delay a bell.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use autobell_common::{DeviceStateMachine, RuntimeConfig, ScheduleEngine};

use crate::commands::{self, CommandAction};
use crate::ports::{BellActuator, FirmwareUpdater, TimeSource};
use crate::store::ScheduleStore;
use crate::sync::{Backend, SyncClient};

/// Fires at most once per period. The first call always fires, so every
/// periodic activity runs on the first loop iteration after boot.
#[derive(Debug)]
struct IntervalTimer {
    period_ms: u64,
    last_fired_ms: Option<u64>,
}

impl IntervalTimer {
    fn new(period_ms: u64) -> Self {
        Self {
            period_ms,
            last_fired_ms: None,
        }
    }

    fn fire(&mut self, now_ms: u64) -> bool {
        let due = match self.last_fired_ms {
            None => true,
            Some(last) => now_ms.saturating_sub(last) >= self.period_ms,
        };
        if due {
            self.last_fired_ms = Some(now_ms);
        }
        due
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The process should end so the supervisor restarts it. Used by the
    /// reboot command and by a staged firmware update.
    Restart,
}

pub struct Orchestrator<B: Backend, Bell, Time, Fw> {
    runtime: RuntimeConfig,
    device: DeviceStateMachine,
    engine: ScheduleEngine,
    client: SyncClient<B>,
    store: ScheduleStore,
    bell: Bell,
    time: Time,
    firmware: Fw,
    register_timer: IntervalTimer,
    sync_timer: IntervalTimer,
    poll_timer: IntervalTimer,
    heartbeat_timer: IntervalTimer,
    force_sync: bool,
}

impl<B, Bell, Time, Fw> Orchestrator<B, Bell, Time, Fw>
where
    B: Backend,
    Bell: BellActuator,
    Time: TimeSource,
    Fw: FirmwareUpdater,
{
    pub fn new(
        runtime: RuntimeConfig,
        device: DeviceStateMachine,
        client: SyncClient<B>,
        store: ScheduleStore,
        bell: Bell,
        time: Time,
        firmware: Fw,
    ) -> Self {
        let timing = &runtime.timing;
        Self {
            register_timer: IntervalTimer::new(timing.command_poll_interval_ms),
            sync_timer: IntervalTimer::new(timing.schedule_sync_interval_ms),
            poll_timer: IntervalTimer::new(timing.command_poll_interval_ms),
            heartbeat_timer: IntervalTimer::new(timing.heartbeat_interval_ms),
            runtime,
            device,
            engine: ScheduleEngine::new(),
            client,
            store,
            bell,
            time,
            firmware,
            force_sync: false,
        }
    }

    /// Seeds the engine from the on-disk cache so bells ring before the
    /// first successful sync. A missing or corrupt cache just means an
    /// empty schedule until the backend is reachable.
    pub async fn load_cached_schedule(&mut self) {
        match self.store.load_schedule().await {
            Ok(document) => {
                self.engine.replace(document.to_set());
                info!(
                    "loaded {} schedule entries from cache",
                    self.engine.entries().len()
                );
            }
            Err(err) => warn!("no usable schedule cache: {err}"),
        }
    }

    pub async fn run(&mut self) -> LoopExit {
        let mut interval =
            tokio::time::interval(Duration::from_millis(self.runtime.timing.tick_interval_ms));
        loop {
            interval.tick().await;
            if let Some(exit) = self.step(monotonic_ms()).await {
                return exit;
            }
        }
    }

    /// One loop iteration. Clock and bell first, provisioning second,
    /// remote traffic last.
    async fn step(&mut self, now_ms: u64) -> Option<LoopExit> {
        match self.time.now() {
            Some(clock) => {
                if self.engine.tick(&clock) {
                    info!(
                        "scheduled bell at {:02}:{:02} (weekday {})",
                        clock.hour, clock.minute, clock.weekday
                    );
                    self.bell.ring();
                }
            }
            None => debug!("clock unavailable, skipping schedule evaluation"),
        }

        if !self.device.is_active() && self.register_timer.fire(now_ms) {
            self.attempt_registration().await;
        }

        if self.device.is_active() {
            let forced = std::mem::take(&mut self.force_sync);
            if self.sync_timer.fire(now_ms) || forced {
                self.sync_schedule().await;
            }
            if self.poll_timer.fire(now_ms) {
                if let Some(exit) = self.poll_and_execute().await {
                    return Some(exit);
                }
            }
        }

        if self.device.identity().remote_id.is_some() && self.heartbeat_timer.fire(now_ms) {
            self.client.send_heartbeat(&self.device).await;
        }

        None
    }

    async fn attempt_registration(&mut self) {
        let result = match self
            .client
            .register(self.device.identity(), &self.runtime.settings.device_name)
            .await
        {
            Ok(result) => result,
            Err(err) => {
                warn!("registration attempt failed: {err}");
                return;
            }
        };

        let transition = self.device.apply_registration(&result);
        info!(
            "registration applied: {} -> {}",
            transition.from.as_str(),
            transition.to.as_str()
        );

        if transition.code_cleared {
            // The backend rejected the code; persist the cleared value so a
            // restart doesn't resubmit it.
            self.runtime.settings.school_code.clear();
            if let Err(err) = self.store.save_runtime(&self.runtime).await {
                warn!("failed to persist cleared school code: {err}");
            }
        }
        if transition.became_active() {
            self.force_sync = true;
        }
    }

    async fn sync_schedule(&mut self) {
        match self.client.fetch_schedule(&self.device).await {
            Ok(document) => {
                if let Err(err) = self.store.save_schedule(&document).await {
                    warn!("failed to cache schedule: {err}");
                }
                self.engine.replace(document.to_set());
                info!(
                    "schedule synchronized, {} entries",
                    self.engine.entries().len()
                );
            }
            Err(err) => warn!("schedule sync failed, keeping current entries: {err}"),
        }
    }

    async fn poll_and_execute(&mut self) -> Option<LoopExit> {
        let command = match self.client.poll_command(&self.device).await {
            Ok(Some(command)) => command,
            Ok(None) => return None,
            Err(err) => {
                warn!("command poll failed: {err}");
                return None;
            }
        };

        let Some(plan) = commands::plan(&command) else {
            // Left pending on the backend; an operator can see it stuck.
            warn!(
                "dropping unexecutable command {} ({})",
                command.id,
                command.kind.as_str()
            );
            return None;
        };

        info!("executing command {} ({})", command.id, command.kind.as_str());
        if plan.ack_first {
            self.client.acknowledge(&command.id).await;
        }
        let exit = self.execute(plan.action).await;
        if !plan.ack_first {
            self.client.acknowledge(&command.id).await;
        }
        exit
    }

    async fn execute(&mut self, action: CommandAction) -> Option<LoopExit> {
        match action {
            CommandAction::Ring => {
                self.bell.ring();
                None
            }
            CommandAction::TestRing => {
                self.bell.test_ring();
                None
            }
            CommandAction::SyncTime => {
                self.time.force_resync();
                None
            }
            CommandAction::Reconfigure => {
                self.attempt_registration().await;
                self.force_sync = true;
                None
            }
            CommandAction::Restart => Some(LoopExit::Restart),
            CommandAction::UpdateFirmware(url) => {
                if self.firmware.apply(&url) {
                    Some(LoopExit::Restart)
                } else {
                    warn!("firmware update from {url} did not stage, continuing");
                    None
                }
            }
        }
    }
}

fn monotonic_ms() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    START
        .get_or_init(Instant::now)
        .elapsed()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::ApiResponse;
    use crate::testutil::{FixedTime, MockBackend, RecordingBell, RecordingFirmware};
    use autobell_common::{
        ClockReading, DaySet, DeviceIdentity, RegistrationResult, ScheduleEntry, ScheduleSet,
        SyncError,
    };
    use std::path::PathBuf;

    fn scratch_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("autobell-orch-{tag}-{}", std::process::id()))
    }

    fn ok(body: &str) -> Result<ApiResponse, SyncError> {
        Ok(ApiResponse {
            status: 200,
            body: body.to_string(),
        })
    }

    fn active_device() -> DeviceStateMachine {
        let mut device =
            DeviceStateMachine::new(DeviceIdentity::new("AA:BB:CC:DD:EE:FF", "SCH-1"));
        device.apply_registration(&RegistrationResult {
            remote_id: "d1".to_string(),
            school_id: Some("S1".to_string()),
            message: Some("OK".to_string()),
        });
        device
    }

    fn orchestrator(
        tag: &str,
        device: DeviceStateMachine,
        backend: MockBackend,
    ) -> Orchestrator<MockBackend, RecordingBell, FixedTime, RecordingFirmware> {
        Orchestrator::new(
            RuntimeConfig::default(),
            device,
            SyncClient::new(backend),
            ScheduleStore::new(scratch_dir(tag)),
            RecordingBell::default(),
            FixedTime::at(ClockReading::new(8, 30, 0, 1)),
            RecordingFirmware::default(),
        )
    }

    #[tokio::test]
    async fn assignment_triggers_sync_in_the_same_step() {
        let backend = MockBackend::with_responses(vec![
            ok(r#"[{"id":"d1","school_id":"S1"}]"#),
            ok(r#"{"schedules":[{"bell_time":"12:00:00","days_of_week":[1,2,3,4,5]}]}"#),
            ok("[]"),
            ok(""),
        ]);
        let mut orch = orchestrator(
            "assign",
            DeviceStateMachine::new(DeviceIdentity::new("AA:BB:CC:DD:EE:FF", "SCH-1")),
            backend.clone(),
        );

        assert_eq!(orch.step(0).await, None);

        assert!(orch.device.is_active());
        assert_eq!(orch.engine.entries().len(), 1);

        let paths: Vec<String> = backend.requests().into_iter().map(|r| r.path).collect();
        assert!(paths[0].contains("register_device"));
        assert!(paths[1].contains("device_schedules"));
        assert!(paths[2].contains("command_queue"));
        assert!(paths[3].contains("update_heartbeat"));
    }

    #[tokio::test]
    async fn rejected_code_is_cleared_and_persisted() {
        let backend = MockBackend::with_responses(vec![ok(
            r#"[{"id":"d1","message":"Invalid School Code"}]"#,
        )]);
        let mut orch = orchestrator(
            "rejected",
            DeviceStateMachine::new(DeviceIdentity::new("AA:BB:CC:DD:EE:FF", "BAD-CODE")),
            backend,
        );
        orch.runtime.settings.school_code = "BAD-CODE".to_string();

        orch.step(0).await;

        assert!(!orch.device.is_active());
        assert!(orch.device.identity().school_code.is_empty());
        let persisted = orch.store.load_runtime().await.unwrap();
        assert!(persisted.settings.school_code.is_empty());
    }

    #[tokio::test]
    async fn bell_rings_once_per_matching_minute() {
        // All network calls fail; ringing must not depend on the backend.
        let backend = MockBackend::with_responses(vec![]);
        let mut orch = orchestrator("ring", active_device(), backend);
        orch.engine.replace(ScheduleSet::from_entries(vec![ScheduleEntry {
            hour: 8,
            minute: 30,
            days: DaySet::from_days(&[1]),
        }]));

        orch.step(0).await;
        orch.step(1_000).await;

        assert_eq!(orch.bell.rings, 1);
    }

    #[tokio::test]
    async fn reboot_command_acks_then_exits() {
        let backend = MockBackend::with_responses(vec![
            ok(r#"{"schedules":[]}"#),
            ok(r#"[{"id":"c9","command":"REBOOT"}]"#),
            ok(""),
        ]);
        let mut orch = orchestrator("reboot", active_device(), backend.clone());

        assert_eq!(orch.step(0).await, Some(LoopExit::Restart));

        let requests = backend.requests();
        let ack = requests.last().unwrap();
        assert!(ack.path.contains("command_queue?id=eq.c9"));
        assert!(ack.body.as_deref().unwrap().contains("executed"));
    }

    #[tokio::test]
    async fn firmware_update_acks_before_applying() {
        let backend = MockBackend::with_responses(vec![
            ok(r#"{"schedules":[]}"#),
            ok(r#"[{"id":"c2","command":"UPDATE_FIRMWARE","payload":{"url":"http://x/fw.bin"}}]"#),
            ok(""),
        ]);
        let mut orch = orchestrator("firmware", active_device(), backend.clone());
        orch.firmware.succeed = true;

        assert_eq!(orch.step(0).await, Some(LoopExit::Restart));

        assert_eq!(orch.firmware.applied, vec!["http://x/fw.bin".to_string()]);
        // The acknowledgement went out before apply consumed the last
        // scripted response.
        assert!(backend
            .requests()
            .last()
            .unwrap()
            .path
            .contains("id=eq.c2"));
    }

    #[tokio::test]
    async fn failed_firmware_stage_keeps_running() {
        let backend = MockBackend::with_responses(vec![
            ok(r#"{"schedules":[]}"#),
            ok(r#"[{"id":"c2","command":"UPDATE_FIRMWARE","payload":{"url":"http://x/fw.bin"}}]"#),
            ok(""),
        ]);
        let mut orch = orchestrator("firmware-fail", active_device(), backend);

        assert_eq!(orch.step(0).await, None);
        assert_eq!(orch.firmware.applied.len(), 1);
    }

    #[tokio::test]
    async fn ring_command_acks_after_execution() {
        let backend = MockBackend::with_responses(vec![
            ok(r#"{"schedules":[]}"#),
            ok(r#"[{"id":"c3","command":"RING"}]"#),
            ok(""),
            ok(""),
        ]);
        let mut orch = orchestrator("ring-cmd", active_device(), backend.clone());

        orch.step(0).await;

        assert_eq!(orch.bell.rings, 1);
        let requests = backend.requests();
        assert!(requests
            .iter()
            .any(|r| r.path.contains("command_queue?id=eq.c3")));
    }

    #[tokio::test]
    async fn test_buzzer_command_uses_test_mode_then_acks() {
        let backend = MockBackend::with_responses(vec![
            ok(r#"{"schedules":[]}"#),
            ok(r#"[{"id":"c5","command":"TEST_BUZZER"}]"#),
            ok(""),
            ok(""),
        ]);
        let mut orch = orchestrator("test-buzzer", active_device(), backend.clone());

        orch.step(0).await;

        assert_eq!(orch.bell.test_rings, 1);
        assert_eq!(orch.bell.rings, 0);
        assert!(backend
            .requests()
            .iter()
            .any(|r| r.path.contains("command_queue?id=eq.c5")));
    }

    #[tokio::test]
    async fn sync_time_command_forces_clock_resync_then_acks() {
        let backend = MockBackend::with_responses(vec![
            ok(r#"{"schedules":[]}"#),
            ok(r#"[{"id":"c6","command":"SYNC_TIME"}]"#),
            ok(""),
            ok(""),
        ]);
        let mut orch = orchestrator("sync-time", active_device(), backend.clone());

        orch.step(0).await;

        assert_eq!(orch.time.resyncs, 1);
        assert!(backend
            .requests()
            .iter()
            .any(|r| r.path.contains("command_queue?id=eq.c6")));
    }

    #[tokio::test]
    async fn poll_outage_leaves_state_and_schedule_untouched() {
        let backend = MockBackend::with_responses(vec![]);
        let mut orch = orchestrator("outage", active_device(), backend);
        orch.engine.replace(ScheduleSet::from_entries(vec![ScheduleEntry {
            hour: 12,
            minute: 0,
            days: DaySet::from_days(&[1]),
        }]));

        assert_eq!(orch.step(0).await, None);

        assert!(orch.device.is_active());
        assert_eq!(orch.engine.entries().len(), 1);
    }

    #[test]
    fn interval_timer_fires_immediately_then_per_period() {
        let mut timer = IntervalTimer::new(5_000);
        assert!(timer.fire(0));
        assert!(!timer.fire(1_000));
        assert!(!timer.fire(4_999));
        assert!(timer.fire(5_000));
        assert!(!timer.fire(9_000));
        assert!(timer.fire(10_500));
    }
}
