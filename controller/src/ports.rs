//! Port traits between the control loop and the hardware collaborators.
//!
//! Driven adapters (bell driver, clock, firmware flasher) implement these;
//! the orchestrator consumes them via generics, so the core never touches
//! hardware directly and tests substitute recording fakes.

use autobell_common::ClockReading;

/// Write-side port for the physical bell.
pub trait BellActuator {
    fn ring(&mut self);

    /// Short diagnostic ring used by the backend's test command.
    fn test_ring(&mut self);
}

/// Read-side port for wall-clock time. `now` returns `None` until the
/// underlying clock has been synced; readings are already normalized to
/// 1=Monday..7=Sunday.
pub trait TimeSource {
    fn now(&self) -> Option<ClockReading>;

    /// Ask the clock collaborator to resynchronize (NTP or equivalent).
    fn force_resync(&mut self);
}

/// Firmware-image transport. `apply` reports whether the update was
/// started; a started update may terminate the process, which is why the
/// command path acknowledges before calling this.
pub trait FirmwareUpdater {
    fn apply(&mut self, url: &str) -> bool;
}
