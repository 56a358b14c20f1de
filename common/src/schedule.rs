use serde::{Deserialize, Serialize};

use crate::types::ClockReading;

/// Set of active weekdays stored as a bitmask, 1=Monday..7=Sunday.
/// Serialized as the backend's `days_of_week` array of day numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Vec<u8>", into = "Vec<u8>")]
pub struct DaySet(u8);

impl DaySet {
    pub fn from_days(days: &[u8]) -> Self {
        let mut mask = 0u8;
        for &day in days {
            if (1..=7).contains(&day) {
                mask |= 1 << (day - 1);
            }
        }
        Self(mask)
    }

    pub fn contains(self, weekday: u8) -> bool {
        (1..=7).contains(&weekday) && self.0 & (1 << (weekday - 1)) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn days(self) -> Vec<u8> {
        (1..=7).filter(|&day| self.contains(day)).collect()
    }
}

impl From<Vec<u8>> for DaySet {
    fn from(days: Vec<u8>) -> Self {
        Self::from_days(&days)
    }
}

impl From<DaySet> for Vec<u8> {
    fn from(set: DaySet) -> Self {
        set.days()
    }
}

/// One bell trigger: hour/minute at minute resolution plus active weekdays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleEntry {
    pub hour: u8,
    pub minute: u8,
    pub days: DaySet,
}

impl ScheduleEntry {
    pub fn validate(&self) -> bool {
        self.hour < 24 && self.minute < 60 && !self.days.is_empty()
    }

    pub fn matches(&self, clock: &ClockReading) -> bool {
        self.hour == clock.hour && self.minute == clock.minute && self.days.contains(clock.weekday)
    }
}

/// Wire/cache row as the backend sends it: `bell_time` is an `"HH:MM:SS"`
/// string whose seconds are discarded on parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRecord {
    pub bell_time: String,
    pub days_of_week: Vec<u8>,
}

impl ScheduleRecord {
    pub fn from_entry(entry: &ScheduleEntry) -> Self {
        Self {
            bell_time: format!("{:02}:{:02}:00", entry.hour, entry.minute),
            days_of_week: entry.days.days(),
        }
    }

    /// Returns `None` for an unparseable time or an out-of-range/day-less
    /// entry; callers drop such rows rather than failing the whole document.
    pub fn to_entry(&self) -> Option<ScheduleEntry> {
        let (hour, minute) = parse_bell_time(&self.bell_time)?;
        let entry = ScheduleEntry {
            hour,
            minute,
            days: DaySet::from_days(&self.days_of_week),
        };
        entry.validate().then_some(entry)
    }
}

fn parse_bell_time(raw: &str) -> Option<(u8, u8)> {
    let mut parts = raw.splitn(3, ':');
    let hour = parts.next()?.parse::<u8>().ok()?;
    let minute = parts.next()?.parse::<u8>().ok()?;
    Some((hour, minute))
}

/// The document persisted to the schedule cache and returned by a schedule
/// fetch: `{ "schedules": [ ... ] }`. A missing `schedules` field is a
/// decode error; an empty array is a valid, explicit empty schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ScheduleDocument {
    pub schedules: Vec<ScheduleRecord>,
}

impl ScheduleDocument {
    pub fn from_set(set: &ScheduleSet) -> Self {
        Self {
            schedules: set.entries.iter().map(ScheduleRecord::from_entry).collect(),
        }
    }

    pub fn to_set(&self) -> ScheduleSet {
        ScheduleSet {
            entries: self
                .schedules
                .iter()
                .filter_map(ScheduleRecord::to_entry)
                .collect(),
        }
    }
}

/// Ordered entry sequence, replaced wholesale on every successful sync.
/// Duplicates are permitted; the engine reports one ring per minute anyway.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScheduleSet {
    pub entries: Vec<ScheduleEntry>,
}

impl ScheduleSet {
    pub fn from_entries(entries: Vec<ScheduleEntry>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Owns the authoritative local schedule and the last-evaluated-minute
/// marker. `tick` may be called every second; it reports a ring at most once
/// per distinct calendar minute regardless of call frequency.
#[derive(Debug, Default)]
pub struct ScheduleEngine {
    set: ScheduleSet,
    last_evaluated: Option<(u8, u8)>,
}

impl ScheduleEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swaps the active set. The minute marker is kept so a mid-minute
    /// replace cannot produce a second ring in the same minute.
    pub fn replace(&mut self, set: ScheduleSet) {
        self.set = set;
    }

    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.set.entries
    }

    /// Evaluates the reading against the active set. The marker is updated
    /// unconditionally on a new minute, match or not, so later calls within
    /// the same minute are no-ops and no `second == 0` alignment is needed.
    pub fn tick(&mut self, clock: &ClockReading) -> bool {
        let stamp = (clock.hour, clock.minute);
        if self.last_evaluated == Some(stamp) {
            return false;
        }
        self.last_evaluated = Some(stamp);

        self.set.entries.iter().any(|entry| entry.matches(clock))
    }
}
