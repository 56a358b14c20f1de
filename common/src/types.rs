use chrono::{DateTime, Datelike, TimeZone, Timelike};

/// Snapshot of the wall clock, produced by a time source per call and never
/// stored. Weekday numbering is 1=Monday..7=Sunday; time sources with a
/// different native numbering normalize before constructing one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockReading {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub weekday: u8,
}

impl ClockReading {
    pub fn new(hour: u8, minute: u8, second: u8, weekday: u8) -> Self {
        Self {
            hour,
            minute,
            second,
            weekday,
        }
    }

    pub fn from_datetime<Tz: TimeZone>(now: &DateTime<Tz>) -> Self {
        Self {
            hour: now.hour() as u8,
            minute: now.minute() as u8,
            second: now.second() as u8,
            // number_from_monday already matches the backend's 1..7 scheme.
            weekday: now.weekday().number_from_monday() as u8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Boot,
    Unassigned,
    Active,
}

impl DeviceState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Boot => "BOOT",
            Self::Unassigned => "UNASSIGNED",
            Self::Active => "ACTIVE",
        }
    }
}

/// Command tags understood by the device. Decoded exactly once at the
/// protocol boundary; anything else becomes `Unrecognized` rather than an
/// unmatched string floating through the dispatch path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Ring,
    TestBuzzer,
    SyncTime,
    Reconfigure,
    Reboot,
    UpdateFirmware,
    Unrecognized,
}

impl CommandKind {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "RING" => Self::Ring,
            "TEST_BUZZER" => Self::TestBuzzer,
            "SYNC_TIME" => Self::SyncTime,
            // The dashboard and mobile app enqueue reconfigure as CONFIG.
            "CONFIG" | "RECONFIGURE" => Self::Reconfigure,
            "REBOOT" => Self::Reboot,
            "UPDATE_FIRMWARE" => Self::UpdateFirmware,
            _ => Self::Unrecognized,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ring => "RING",
            Self::TestBuzzer => "TEST_BUZZER",
            Self::SyncTime => "SYNC_TIME",
            Self::Reconfigure => "RECONFIGURE",
            Self::Reboot => "REBOOT",
            Self::UpdateFirmware => "UPDATE_FIRMWARE",
            Self::Unrecognized => "UNRECOGNIZED",
        }
    }
}

/// A pending command materialized from one poll response. Consumed exactly
/// once: either executed and acknowledged, or dropped silently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub id: String,
    pub kind: CommandKind,
    pub firmware_url: Option<String>,
}
