//! Wake/sleep schedule

use std::fmt;

use chrono::NaiveTime;
use light_api::models::Schedule;
use tracing::warn;

use crate::errors::ClientError;
use crate::models::light::LightId;

/// Wire format for a time of day
const TIME_OF_DAY_FORMAT: &str = "%H:%M";

/// One independently tracked schedule field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScheduleField {
    WakeUp,
    WakeUpLight,
    Sleep,
    SleepLight,
}

impl fmt::Display for ScheduleField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScheduleField::WakeUp => "wake_up",
            ScheduleField::WakeUpLight => "wake_up_light_id",
            ScheduleField::Sleep => "sleep",
            ScheduleField::SleepLight => "sleep_light_id",
        };
        f.write_str(s)
    }
}

/// A requested change to one schedule field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleEdit {
    WakeUp(NaiveTime),
    WakeUpLight(LightId),
    Sleep(NaiveTime),
    SleepLight(LightId),
}

impl ScheduleEdit {
    pub fn field(&self) -> ScheduleField {
        match self {
            ScheduleEdit::WakeUp(_) => ScheduleField::WakeUp,
            ScheduleEdit::WakeUpLight(_) => ScheduleField::WakeUpLight,
            ScheduleEdit::Sleep(_) => ScheduleField::Sleep,
            ScheduleEdit::SleepLight(_) => ScheduleField::SleepLight,
        }
    }
}

/// Parse an `HH:MM` time of day
pub fn parse_time_of_day(value: &str) -> Result<NaiveTime, ClientError> {
    NaiveTime::parse_from_str(value.trim(), TIME_OF_DAY_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(value.trim(), "%H:%M:%S"))
        .map_err(|e| ClientError::ValidationError(format!("invalid time of day '{}': {}", value, e)))
}

/// Format a time of day as `HH:MM`
pub fn format_time_of_day(time: &NaiveTime) -> String {
    time.format(TIME_OF_DAY_FORMAT).to_string()
}

/// Schedule as reported by a poll. `None` means the service returned no
/// value for the field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteSchedule {
    pub wake_up: Option<NaiveTime>,
    pub wake_up_light: Option<LightId>,
    pub sleep: Option<NaiveTime>,
    pub sleep_light: Option<LightId>,
}

impl RemoteSchedule {
    pub fn from_wire(schedule: Schedule) -> Self {
        Self {
            wake_up: schedule.wake_up.as_deref().and_then(lenient_time),
            wake_up_light: non_empty(schedule.wake_up_light_id).map(LightId::from),
            sleep: schedule.sleep.as_deref().and_then(lenient_time),
            sleep_light: non_empty(schedule.sleep_light_id).map(LightId::from),
        }
    }
}

/// Build the write body for a set of edits. Fields that are not edited are
/// left out so the service keeps its current values.
pub fn edits_to_wire(edits: &[ScheduleEdit]) -> Schedule {
    let mut schedule = Schedule::default();
    for edit in edits {
        match edit {
            ScheduleEdit::WakeUp(t) => schedule.wake_up = Some(format_time_of_day(t)),
            ScheduleEdit::WakeUpLight(id) => schedule.wake_up_light_id = Some(id.to_string()),
            ScheduleEdit::Sleep(t) => schedule.sleep = Some(format_time_of_day(t)),
            ScheduleEdit::SleepLight(id) => schedule.sleep_light_id = Some(id.to_string()),
        }
    }
    schedule
}

fn lenient_time(value: &str) -> Option<NaiveTime> {
    if value.trim().is_empty() {
        return None;
    }
    match parse_time_of_day(value) {
        Ok(t) => Some(t),
        Err(e) => {
            warn!("Ignoring schedule time from service: {}", e);
            None
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
