//! HomeGlow client library
//!
//! Session management, remote state polling, optimistic mutations and the
//! reconciliation engine that keeps the displayed light state consistent.

pub mod app;
pub mod authn;
pub mod errors;
pub mod filesys;
pub mod http;
pub mod logs;
pub mod models;
pub mod storage;
pub mod sync;
pub mod utils;
pub mod workers;
