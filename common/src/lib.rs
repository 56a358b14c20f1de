pub mod config;
pub mod device;
pub mod protocol;
pub mod schedule;
pub mod types;

pub use config::{BackendConfig, ProvisionedSettings, RuntimeConfig, TimingConfig};
pub use device::{DeviceIdentity, DeviceStateMachine, Transition};
pub use protocol::{RegistrationResult, SyncError};
pub use schedule::{
    DaySet, ScheduleDocument, ScheduleEngine, ScheduleEntry, ScheduleRecord, ScheduleSet,
};
pub use types::{ClockReading, Command, CommandKind, DeviceState};
