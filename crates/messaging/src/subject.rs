//! Subject rules shared by every backend.
//!
//! Subjects are dot-delimited tokens. In subscribe patterns `*` matches exactly
//! one token and `>` matches one or more trailing tokens.

use crate::Error;

/// Pattern that matches every subject.
pub const FULL_WILDCARD: &str = ">";

const SINGLE_WILDCARD: &str = "*";
const CONSUMER_PREFIX: &str = "consumer_";

/// Validates a subject used as a publish target.
///
/// # Errors
///
/// Returns `Error::InvalidSubject` if the subject is empty or contains a wildcard token.
pub fn validate_publish_subject(subject: &str) -> Result<(), Error> {
    if subject.is_empty() {
        return Err(invalid(subject, "subject must not be empty"));
    }

    if subject
        .split('.')
        .any(|token| token == SINGLE_WILDCARD || token == FULL_WILDCARD)
    {
        return Err(invalid(subject, "wildcards cannot be published to"));
    }

    Ok(())
}

/// Validates a subject used as a subscribe pattern.
///
/// # Errors
///
/// Returns `Error::InvalidSubject` if the pattern is empty or `>` is not the final token.
pub fn validate_pattern(pattern: &str) -> Result<(), Error> {
    if pattern.is_empty() {
        return Err(invalid(pattern, "pattern must not be empty"));
    }

    let mut tokens = pattern.split('.').peekable();
    while let Some(token) = tokens.next() {
        if token == FULL_WILDCARD && tokens.peek().is_some() {
            return Err(invalid(pattern, "`>` must be the last token"));
        }
    }

    Ok(())
}

/// Returns true if `subject` is matched by `pattern`.
#[must_use]
pub fn matches(pattern: &str, subject: &str) -> bool {
    let mut pattern_tokens = pattern.split('.');
    let mut subject_tokens = subject.split('.');

    loop {
        match (pattern_tokens.next(), subject_tokens.next()) {
            (Some(FULL_WILDCARD), Some(_)) => return true,
            (Some(SINGLE_WILDCARD), Some(_)) => {}
            (Some(expected), Some(actual)) if expected == actual => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// Subject patterns a durable subscription provisions its stream for.
///
/// A subject already ending in `>` covers its children, so no `.*` extension is added.
#[must_use]
pub fn durable_stream_subjects(subject: &str) -> Vec<String> {
    if subject == FULL_WILDCARD || subject.ends_with(".>") {
        vec![subject.to_string()]
    } else {
        vec![subject.to_string(), format!("{subject}.*")]
    }
}

/// Broker-safe durable consumer name derived from a subject.
#[must_use]
pub fn consumer_name(subject: &str) -> String {
    let mut name = String::with_capacity(CONSUMER_PREFIX.len() + subject.len());
    name.push_str(CONSUMER_PREFIX);

    for (index, token) in subject.split('.').enumerate() {
        if index > 0 {
            name.push('_');
        }
        match token {
            SINGLE_WILDCARD => name.push_str("any"),
            FULL_WILDCARD => name.push_str("all"),
            other => name.push_str(other),
        }
    }

    name
}

fn invalid(subject: &str, reason: &'static str) -> Error {
    Error::InvalidSubject {
        subject: subject.to_string(),
        reason,
    }
}
