//! Local storage: layout, settings and the credential key-value store

pub mod kv;
pub mod layout;
pub mod settings;
