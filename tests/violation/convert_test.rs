//! Tests for event message parsing and violation conversion.

use tripwire::violation::{convert, ConvertError};

use crate::support::{
    after_start, cluster_event, policy, require_labels_policy, rule, POLICY_UID, SCENARIO_MESSAGE,
};

#[test]
fn converts_rule_keyword_message() {
    let event = cluster_event(SCENARIO_MESSAGE, after_start(5), after_start(5));
    let violation = convert(&event, &require_labels_policy(), false).expect("should convert");

    assert_eq!(violation.resource.kind, "Pod");
    assert_eq!(violation.resource.namespace, "test-ns");
    assert_eq!(violation.resource.name, "my-pod");
    assert_eq!(violation.policy.rule, "require-labels");
    assert_eq!(violation.policy.name, "require-labels");
    assert!(!violation.updated);
}

#[test]
fn converts_bracketed_rule_message() {
    let event = cluster_event(
        "Deployment default/nginx: [check-for-labels] fail (blocked); validation error: missing labels",
        after_start(1),
        after_start(1),
    );
    let policy = policy(POLICY_UID, "require-labels", vec![rule("check-for-labels", None)]);

    let violation = convert(&event, &policy, true).expect("should convert");

    assert_eq!(violation.resource.kind, "Deployment");
    assert_eq!(violation.resource.namespace, "default");
    assert_eq!(violation.resource.name, "nginx");
    assert_eq!(violation.policy.rule, "check-for-labels");
    assert!(violation.updated);
}

#[test]
fn resource_without_namespace_keeps_name_only() {
    let event = cluster_event(
        "Namespace team-a: [require-owner] fail (blocked)",
        after_start(1),
        after_start(1),
    );
    let violation = convert(&event, &require_labels_policy(), false).expect("should convert");

    assert_eq!(violation.resource.kind, "Namespace");
    assert_eq!(violation.resource.namespace, "");
    assert_eq!(violation.resource.name, "team-a");
}

#[test]
fn matching_rule_resolves_to_first_rule_template() {
    let event = cluster_event(
        "Pod default/web: [require-requests] fail (blocked)",
        after_start(1),
        after_start(1),
    );
    let policy = policy(
        POLICY_UID,
        "pod-hygiene",
        vec![
            rule("require-labels", Some("labels are required")),
            rule("require-requests", Some("resource requests are required")),
        ],
    );

    let violation = convert(&event, &policy, false).expect("should convert");

    assert_eq!(violation.policy.rule, "require-requests");
    assert_eq!(violation.policy.message, "labels are required");
}

#[test]
fn first_rule_without_template_resolves_to_empty_message() {
    let event = cluster_event(
        "Pod default/web: [require-requests] fail (blocked)",
        after_start(1),
        after_start(1),
    );
    let policy = policy(
        POLICY_UID,
        "pod-hygiene",
        vec![
            rule("require-labels", None),
            rule("require-requests", Some("resource requests are required")),
        ],
    );

    let violation = convert(&event, &policy, false).expect("should convert");
    assert_eq!(violation.policy.message, "");
}

#[test]
fn unmatched_rule_keeps_raw_message() {
    let message = "Pod default/web: [unknown-rule] fail (blocked)";
    let event = cluster_event(message, after_start(1), after_start(1));

    let violation = convert(&event, &require_labels_policy(), false).expect("should convert");

    assert_eq!(violation.policy.rule, "unknown-rule");
    assert_eq!(violation.policy.message, message);
}

#[test]
fn copies_policy_metadata_and_event_identity() {
    let event = cluster_event(SCENARIO_MESSAGE, after_start(1), after_start(30));
    let violation = convert(&event, &require_labels_policy(), false).expect("should convert");

    assert_eq!(violation.policy.category, "Best Practices");
    assert_eq!(violation.policy.severity, "medium");
    assert_eq!(violation.timestamp, after_start(30));
    assert_eq!(violation.event.name, "require-labels.17a3");
    assert_eq!(violation.event.uid, "ev-uid-1");
}

#[test]
fn timestamp_falls_back_to_creation_time() {
    let mut event = cluster_event(SCENARIO_MESSAGE, after_start(7), after_start(7));
    event.last_timestamp = None;

    let violation = convert(&event, &require_labels_policy(), false).expect("should convert");
    assert_eq!(violation.timestamp, after_start(7));
}

#[test]
fn conversion_is_deterministic() {
    let event = cluster_event(SCENARIO_MESSAGE, after_start(1), after_start(2));
    let policy = require_labels_policy();

    let first = convert(&event, &policy, true).expect("first conversion");
    let second = convert(&event, &policy, true).expect("second conversion");
    assert_eq!(first, second);
}

#[test]
fn short_message_is_malformed() {
    for message in ["", "Pod", "Pod default/nginx:", "Pod default/nginx: rule"] {
        let event = cluster_event(message, after_start(1), after_start(1));
        let result = convert(&event, &require_labels_policy(), false);
        assert!(
            matches!(result, Err(ConvertError::MalformedEventText { .. })),
            "expected malformed for {message:?}, got {result:?}"
        );
    }
}

#[test]
fn serializes_camel_case_json() {
    let event = cluster_event(SCENARIO_MESSAGE, after_start(1), after_start(1));
    let violation = convert(&event, &require_labels_policy(), true).expect("should convert");

    let json = serde_json::to_value(&violation).expect("serialize");
    assert_eq!(json["resource"]["namespace"], "test-ns");
    assert_eq!(json["policy"]["rule"], "require-labels");
    assert_eq!(json["updated"], true);
    assert_eq!(json["event"]["uid"], "ev-uid-1");
    assert!(json["timestamp"].is_string());
}
