//! Request and response bodies exchanged with the light-control service.

pub mod models;
