//! Authentication: credential, identity provider seam and session manager

pub mod credential;
pub mod identity;
pub mod session;
