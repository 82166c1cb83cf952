//! Redaction helpers for log output
//!
//! Login flows handle emails, bearer tokens and cookie strings. Anything that
//! reaches a `tracing` macro goes through one of these first.

/// Masks an email address, keeping two characters of the local part
///
/// ```
/// use blogroll_lib::security::redact;
///
/// assert_eq!(redact::email("alice@example.com"), "al...@example.com");
/// assert_eq!(redact::email("a@b.com"), "***@b.com");
/// assert_eq!(redact::email("invalid"), "***");
/// ```
pub fn email(email: &str) -> String {
    match email.find('@') {
        Some(at_pos) => {
            let (local, domain) = email.split_at(at_pos);
            if local.chars().count() > 2 {
                let head: String = local.chars().take(2).collect();
                format!("{}...{}", head, domain)
            } else {
                format!("***{}", domain)
            }
        }
        None => "***".to_string(),
    }
}

/// Masks a token, keeping only its last four characters
///
/// ```
/// use blogroll_lib::security::redact;
///
/// assert_eq!(redact::token("eyJhbGciOi.payload.sig1234"), "***1234");
/// assert_eq!(redact::token("abcd"), "****");
/// ```
pub fn token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() > 4 {
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("***{}", tail)
    } else {
        "****".to_string()
    }
}

/// Masks the value of a `name=value` cookie pair, keeping the name
///
/// ```
/// use blogroll_lib::security::redact;
///
/// assert_eq!(redact::cookie("refresh_token=abcdefgh"), "refresh_token=***efgh");
/// ```
pub fn cookie(pair: &str) -> String {
    match pair.split_once('=') {
        Some((name, value)) => format!("{}={}", name.trim(), token(value.trim())),
        None => token(pair),
    }
}

/// Drops query string and fragment from a URL
pub fn url(url: &str) -> String {
    url.split(['?', '#']).next().unwrap_or(url).to_string()
}
