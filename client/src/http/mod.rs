//! HTTP adapters for the light service and the identity provider

pub mod client;
pub mod energy;
pub mod identity;
pub mod lights;
pub mod notifications;
pub mod schedule;
pub mod service;
pub mod timer;
