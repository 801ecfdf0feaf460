//! Idle timeout duration

use std::fmt;

use light_api::models::TimerRequest;
use serde::{Deserialize, Serialize};

use crate::errors::ClientError;

/// Idle timeout after which a light switches itself off.
///
/// Stored as total seconds so that `1h` and `60m` compare equal, which is
/// what the service reports back on a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerDuration {
    total_seconds: u64,
}

impl TimerDuration {
    pub fn new(hours: u32, minutes: u32, seconds: u32) -> Self {
        let total_seconds = hours as u64 * 3600 + minutes as u64 * 60 + seconds as u64;
        Self { total_seconds }
    }

    pub fn from_total_seconds(total_seconds: u64) -> Self {
        Self { total_seconds }
    }

    pub fn total_seconds(&self) -> u64 {
        self.total_seconds
    }

    pub fn is_zero(&self) -> bool {
        self.total_seconds == 0
    }

    /// Normalized (hours, minutes, seconds)
    pub fn hms(&self) -> (u32, u32, u32) {
        // saturates for absurd values reported by the service
        let hours = u32::try_from(self.total_seconds / 3600).unwrap_or(u32::MAX);
        let minutes = ((self.total_seconds % 3600) / 60) as u32;
        let seconds = (self.total_seconds % 60) as u32;
        (hours, minutes, seconds)
    }

    /// Reject durations the service must never receive
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.is_zero() {
            return Err(ClientError::ValidationError(
                "timer duration must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn to_request(&self) -> TimerRequest {
        let (hours, minutes, seconds) = self.hms();
        TimerRequest {
            hours,
            minutes,
            seconds,
        }
    }
}

impl fmt::Display for TimerDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.total_seconds >= 3600 {
            write!(f, "{} hr", self.total_seconds / 3600)
        } else if self.total_seconds >= 60 {
            write!(f, "{} min", self.total_seconds / 60)
        } else {
            write!(f, "{} sec", self.total_seconds)
        }
    }
}
