//! API models

use serde::{Deserialize, Serialize};

/// Power status of a single light
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PowerStatus {
    On,
    Off,
}

impl PowerStatus {
    /// The opposite status
    pub fn toggled(self) -> Self {
        match self {
            PowerStatus::On => PowerStatus::Off,
            PowerStatus::Off => PowerStatus::On,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PowerStatus::On => "ON",
            PowerStatus::Off => "OFF",
        }
    }
}

/// Light control request (`POST /light/control`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LightControlRequest {
    pub email: String,
    pub status: PowerStatus,
    pub light_id: String,
}

/// One entry of the light status response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LightStatusEntry {
    pub light_id: String,
    pub status: PowerStatus,
}

/// Light status response (`GET /light/status`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LightStatusResponse {
    #[serde(default)]
    pub lights: Vec<LightStatusEntry>,
}

/// Known light identifiers (`GET /apiEntrypoint/light/list`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LightListResponse {
    #[serde(default)]
    pub lights: Vec<String>,
}

/// Wake/sleep schedule as stored by the service.
///
/// Times are `HH:MM`. Every field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wake_up: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wake_up_light_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sleep: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sleep_light_id: Option<String>,
}

/// Schedule response (`GET /apiEntrypoint/light/schedule`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleResponse {
    #[serde(default)]
    pub schedule: Option<Schedule>,
}

/// Idle timeout write (`PUT /timer`)
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimerRequest {
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
}

/// Idle timeout as reported by the service
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Timeout {
    #[serde(default)]
    pub total_seconds: Option<u64>,
}

/// Idle timeout response (`GET /timer`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimeoutResponse {
    #[serde(default)]
    pub timeout: Option<Timeout>,
}

/// Auto-timeout flag, used for both `PUT /auto-timeout` and `GET /timer_status`
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AutoTimeout {
    #[serde(default)]
    pub auto_timeout_enabled: Option<bool>,
}

/// Notification settings (`/apiEntrypoint/notification-settings`)
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct NotificationSettings {
    #[serde(default)]
    pub notify_duration: Option<u32>,
}

/// Device pairing request (`POST /apiEntrypoint/pair-device`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairDeviceRequest {
    pub device_id: String,
    pub email: String,
}

/// Energy analytics (`GET /energy-data?email=...`).
///
/// Only the owner is typed; the readings are passed through as reported.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnergyData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(flatten)]
    pub readings: serde_json::Map<String, serde_json::Value>,
}

/// Error payload returned by the service on failure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub detail: Option<String>,
}
