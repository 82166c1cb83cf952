//! Security module - Token handling and log redaction
//!
//! - `Token`: zeroizing, redacted holder for access and CSRF tokens
//! - `redact`: masking helpers for emails, tokens, cookies and URLs

pub mod redact;
mod token;

pub use token::Token;
