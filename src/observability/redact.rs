//! Secret redaction for logs and the session log (§4.9).

use std::fmt;

/// A string wrapper whose `Display`/`Debug` always show `[REDACTED]`.
///
/// The wrapped value is never exposed except through [`as_str`](Self::as_str)
/// or [`into_inner`](Self::into_inner), so a stray `{:?}` in a log line can't
/// leak an API key.
#[derive(Clone)]
pub struct RedactedString {
    inner: String,
}

impl RedactedString {
    pub fn new<S: Into<String>>(value: S) -> Self {
        Self { inner: value.into() }
    }

    /// Access the inner value. Use only where the raw value is actually
    /// needed, e.g. building an HTTP header.
    pub fn as_str(&self) -> &str {
        &self.inner
    }

    pub fn into_inner(self) -> String {
        self.inner
    }
}

impl fmt::Display for RedactedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl fmt::Debug for RedactedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RedactedString(\"[REDACTED]\")")
    }
}

/// Redact `sk-...` style API keys.
pub fn redact_api_key(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c == 's' && chars.peek() == Some(&'k') {
            chars.next();
            if chars.peek() == Some(&'-') {
                chars.next();
                while let Some(&nc) = chars.peek() {
                    if nc.is_alphanumeric() || nc == '_' || nc == '-' {
                        chars.next();
                    } else {
                        break;
                    }
                }
                result.push_str("sk-***REDACTED***");
                continue;
            }
            result.push('s');
            result.push('k');
            continue;
        }
        result.push(c);
    }

    result
}

/// Redact `Authorization: Bearer TOKEN` headers.
pub fn redact_auth_header(s: &str) -> String {
    if let Some(pos) = s.to_lowercase().find("bearer ") {
        let before = &s[..pos + 7];
        let after = &s[pos + 7..];
        let token_end = after.find(|c: char| c.is_whitespace()).unwrap_or(after.len());
        let rest = &after[token_end..];
        format!("{before}***REDACTED***{rest}")
    } else {
        s.to_string()
    }
}

/// Redact `"api_key": "..."` or `"INFERENCE_API_KEY": "..."` values in JSON-like text.
pub fn redact_api_key_in_json(s: &str) -> String {
    for needle in ["\"api_key\"", "\"INFERENCE_API_KEY\""] {
        if let Some(pos) = s.find(needle) {
            let before = &s[..pos];
            let after = &s[pos..];
            if let Some(colon_pos) = after.find(':') {
                let after_colon = &after[colon_pos + 1..];
                if let Some(quote_start) = after_colon.find('"') {
                    let after_quote = &after_colon[quote_start + 1..];
                    if let Some(quote_end) = after_quote.find('"') {
                        let rest = &after_quote[quote_end + 1..];
                        return format!("{before}{needle}: \"***REDACTED***\"{rest}");
                    }
                }
            }
        }
    }
    s.to_string()
}

/// Apply every redaction pattern above.
pub fn redact_all(s: &str) -> String {
    let s = redact_api_key(s);
    let s = redact_auth_header(&s);
    redact_api_key_in_json(&s)
}
