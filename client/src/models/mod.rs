//! Domain models

pub mod light;
pub mod schedule;
pub mod snapshot;
pub mod timer;
