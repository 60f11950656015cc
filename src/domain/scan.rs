//! Scanned payload decoding.
//!
//! A scan event is a plain text string. Member cards either carry a bare key or a
//! prefixed form such as `BB:1234`, where `BB` is the program scheme.

use std::fmt;

/// Key used to find a member in the directory
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum LookupKey {
    Email(String),
    ExternalId(String),
}

impl fmt::Display for LookupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupKey::Email(email) => write!(f, "email {email}"),
            LookupKey::ExternalId(code) => write!(f, "code {code}"),
        }
    }
}

/// Extract the lookup key from a scanned payload
///
/// * `<scheme>:<key>` (scheme compared case-insensitively) gives an external id
/// * a bare payload containing `@` gives an email
/// * any other bare payload gives an external id
///
/// Returns `None` when there is nothing to look up.
pub fn parse_payload(payload: &str, scheme: &str) -> Option<LookupKey> {
    let payload = payload.trim();
    if payload.is_empty() {
        return None;
    }

    if let Some((prefix, key)) = payload.split_once(':') {
        if prefix.trim().eq_ignore_ascii_case(scheme) {
            let key = key.trim();
            return (!key.is_empty()).then(|| LookupKey::ExternalId(key.to_string()));
        }
    }

    if payload.contains('@') {
        Some(LookupKey::Email(payload.to_string()))
    } else {
        Some(LookupKey::ExternalId(payload.to_string()))
    }
}
