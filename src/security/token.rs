//! Token material with automatic memory zeroization
//!
//! Access and CSRF tokens are bearer credentials: anyone holding the bytes can
//! act as the user. `Token` wipes its buffer on drop and never prints its
//! content through `Debug`.

use std::fmt;
use std::ops::Deref;

use serde::{Deserialize, Deserializer};
use zeroize::Zeroize;

use super::redact;

/// An opaque bearer token that zeroes its memory when dropped
///
/// # Example
///
/// ```
/// use blogroll_lib::security::Token;
///
/// let token = Token::new("tok-1");
/// assert_eq!(token.expose(), "tok-1");
/// assert!(!format!("{:?}", token).contains("tok-1"));
/// ```
#[derive(Clone)]
pub struct Token {
    inner: String,
}

impl Token {
    /// Wraps a token value
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            inner: value.into(),
        }
    }

    /// Returns the raw token value
    ///
    /// Callers must not log the returned slice; use [`Token::redacted`].
    pub fn expose(&self) -> &str {
        &self.inner
    }

    /// Returns a form safe for logs (last four characters only)
    pub fn redacted(&self) -> String {
        redact::token(&self.inner)
    }

    /// Returns the value formatted as an `Authorization` header
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.inner)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Drop for Token {
    fn drop(&mut self) {
        self.inner.zeroize();
    }
}

impl Zeroize for Token {
    fn zeroize(&mut self) {
        self.inner.zeroize();
    }
}

impl Deref for Token {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl From<String> for Token {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for Token {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl<'de> Deserialize<'de> for Token {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer).map(Token::new)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Token").field(&self.redacted()).finish()
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        constant_time_eq(self.inner.as_bytes(), other.inner.as_bytes())
    }
}

impl Eq for Token {}

impl PartialEq<str> for Token {
    fn eq(&self, other: &str) -> bool {
        constant_time_eq(self.inner.as_bytes(), other.as_bytes())
    }
}

impl PartialEq<&str> for Token {
    fn eq(&self, other: &&str) -> bool {
        constant_time_eq(self.inner.as_bytes(), other.as_bytes())
    }
}

/// Constant-time byte comparison
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}
