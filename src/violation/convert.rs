//! Conversion of a Kyverno event into a [`Violation`].
//!
//! Kyverno does not attach the blocked resource or the rule to the event in
//! structured form; both only appear in the message, which looks like
//!
//! ```text
//! Pod test-ns/my-pod: [require-labels] fail (blocked); validation error: ...
//! Pod test-ns/my-pod: rule (require-labels) validation error: ... (blocked)
//! ```
//!
//! Token 0 is the kind, token 1 the `namespace/name` (trailing colon
//! dropped), and the next token, after an optional `rule` keyword, is the
//! bracketed rule name.

use super::{Violation, ViolationEvent, ViolationPolicy, ViolationResource};
use crate::events::ClusterEvent;
use crate::policy::Policy;

const RULE_KEYWORD: &str = "rule";

/// Errors from [`convert`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConvertError {
    /// The message does not follow the `<Kind> <ns>/<name>: <rule> ...` shape.
    #[error("malformed event text ({reason}): {message:?}")]
    MalformedEventText {
        /// Which part of the message was missing.
        reason: &'static str,
        /// The offending message.
        message: String,
    },
}

/// Build a violation from `event`, enriched with `policy`.
///
/// When any rule of `policy` has the parsed rule name, the message is the
/// validation message of the policy's *first* rule, not of the matching one.
/// Downstream consumers rely on this, so it is kept as is. Without a match
/// the raw event message is used.
///
/// # Errors
///
/// Returns [`ConvertError::MalformedEventText`] when the message is too short
/// or the resource or rule token is empty.
pub fn convert(
    event: &ClusterEvent,
    policy: &Policy,
    updated: bool,
) -> Result<Violation, ConvertError> {
    let parsed = parse_message(&event.message)?;

    Ok(Violation {
        resource: ViolationResource {
            kind: parsed.kind.to_owned(),
            namespace: parsed.namespace.to_owned(),
            name: parsed.name.to_owned(),
        },
        policy: ViolationPolicy {
            name: policy.name.clone(),
            rule: parsed.rule.to_owned(),
            message: resolve_message(policy, parsed.rule, &event.message),
            category: policy.category.clone(),
            severity: policy.severity.clone(),
        },
        timestamp: event
            .last_timestamp
            .or(event.creation_timestamp)
            .unwrap_or_default(),
        updated,
        event: ViolationEvent {
            name: event.name.clone(),
            uid: event.uid.clone(),
        },
    })
}

struct ParsedMessage<'a> {
    kind: &'a str,
    namespace: &'a str,
    name: &'a str,
    rule: &'a str,
}

fn parse_message(message: &str) -> Result<ParsedMessage<'_>, ConvertError> {
    let malformed = |reason| ConvertError::MalformedEventText {
        reason,
        message: message.to_owned(),
    };

    let mut tokens = message.split(' ');

    let kind = tokens
        .next()
        .map(str::trim)
        .filter(|kind| !kind.is_empty())
        .ok_or_else(|| malformed("missing resource kind"))?;

    let resource = tokens.next().ok_or_else(|| malformed("missing resource"))?;
    let resource = resource
        .strip_suffix(|c: char| c.is_ascii_punctuation())
        .unwrap_or(resource);

    let mut rule_token = tokens.next().ok_or_else(|| malformed("missing rule"))?;
    if rule_token == RULE_KEYWORD {
        rule_token = tokens.next().ok_or_else(|| malformed("missing rule"))?;
    }
    let rule = strip_brackets(rule_token).trim();
    if rule.is_empty() {
        return Err(malformed("empty rule name"));
    }

    let segments: Vec<&str> = resource.split('/').collect();
    let (namespace, name) = match segments.as_slice() {
        [namespace, name] => (namespace.trim(), name.trim()),
        _ => ("", segments.first().copied().unwrap_or_default().trim()),
    };
    if name.is_empty() {
        return Err(malformed("empty resource name"));
    }

    Ok(ParsedMessage {
        kind,
        namespace,
        name,
        rule,
    })
}

fn strip_brackets(token: &str) -> &str {
    let token = token.strip_prefix(['[', '(']).unwrap_or(token);
    token.strip_suffix([']', ')']).unwrap_or(token)
}

fn resolve_message(policy: &Policy, rule: &str, raw: &str) -> String {
    if policy.rules.iter().any(|r| r.name == rule) {
        policy
            .rules
            .first()
            .and_then(|r| r.validate_message.clone())
            .unwrap_or_default()
    } else {
        raw.to_owned()
    }
}
