//! API module - Backend contract for the session lifecycle
//!
//! - `AuthApi`: the operations the session core depends on
//! - `HttpAuthApi`: reqwest implementation against the blogging backend

mod base;
mod client;

pub use base::{AccessGrant, ApiError, AuthApi};
pub use client::{HttpAuthApi, CSRF_HEADER};

#[cfg(test)]
pub use base::MockAuthApi;
