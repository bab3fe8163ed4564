//! Kyverno policy model, the shared policy store, and the watcher feeding it.
//!
//! Policies are written by [`watcher::PolicyWatcher`] and read by the event
//! pipeline and the HTTP API through [`store::PolicyStore`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod kyverno;
pub mod store;
pub mod watcher;

pub use store::PolicyStore;

/// What a rule does when it matches a resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RuleType {
    /// `validate` rule.
    #[default]
    Validation,
    /// `mutate` rule.
    Mutation,
    /// `generate` rule.
    Generation,
    /// `verifyImages` rule.
    ImageVerify,
}

/// One named check within a [`Policy`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Validation message template, when the rule defines one.
    #[serde(rename = "message", default, skip_serializing_if = "Option::is_none")]
    pub validate_message: Option<String>,

    /// Rule name, unique within its policy.
    pub name: String,

    /// Rule kind.
    #[serde(rename = "type")]
    pub rule_type: RuleType,
}

/// A cluster policy resource (`ClusterPolicy` or namespaced `Policy`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    /// Resource kind.
    pub kind: String,

    /// Policy name.
    pub name: String,

    /// Namespace for namespaced policies; empty for cluster policies.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,

    /// Controllers the policy is auto-generated for.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub autogen_controllers: Vec<String>,

    /// `enforce` or `audit`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub validation_failure_action: String,

    /// Whether the policy is also applied to existing resources.
    pub background: bool,

    /// Rules in declaration order.
    pub rules: Vec<Rule>,

    /// `policies.kyverno.io/category` annotation.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub category: String,

    /// `policies.kyverno.io/description` annotation.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    /// `policies.kyverno.io/severity` annotation.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub severity: String,

    /// When the resource was created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,

    /// Kubernetes UID; the store key.
    pub uid: String,

    /// Raw resource content as pretty JSON.
    pub content: String,
}
