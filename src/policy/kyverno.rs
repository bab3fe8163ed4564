//! Mapping of Kyverno `ClusterPolicy` / `Policy` resources onto [`Policy`].

use kube::api::{ApiResource, DynamicObject, GroupVersionKind};
use kube::ResourceExt;
use serde_json::Value;

use super::{Policy, Rule, RuleType};

const ANNOTATION_CATEGORY: &str = "policies.kyverno.io/category";
const ANNOTATION_SEVERITY: &str = "policies.kyverno.io/severity";
const ANNOTATION_DESCRIPTION: &str = "policies.kyverno.io/description";
const ANNOTATION_AUTOGEN: &str = "pod-policies.kyverno.io/autogen-controllers";

/// The two Kyverno policy resource kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    /// Cluster-scoped `ClusterPolicy`.
    ClusterPolicy,
    /// Namespaced `Policy`.
    Policy,
}

impl PolicyKind {
    /// Resource kind name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClusterPolicy => "ClusterPolicy",
            Self::Policy => "Policy",
        }
    }

    /// Dynamic API descriptor for `kyverno.io/v1`.
    pub fn api_resource(self) -> ApiResource {
        ApiResource::from_gvk(&GroupVersionKind::gvk("kyverno.io", "v1", self.as_str()))
    }
}

/// Errors from mapping a policy resource.
#[derive(Debug, thiserror::Error)]
pub enum PolicyParseError {
    /// The object carries no UID and cannot be keyed.
    #[error("{kind} {name} has no uid")]
    MissingUid {
        /// Resource kind.
        kind: String,
        /// Resource name.
        name: String,
    },

    /// The raw content could not be rendered.
    #[error("failed to render content of {name}: {source}")]
    Content {
        /// Resource name.
        name: String,
        /// Underlying serializer error.
        #[source]
        source: serde_json::Error,
    },
}

/// Build a [`Policy`] from a dynamic Kyverno resource.
///
/// The kind recorded on the object wins over `kind` when present.
///
/// # Errors
///
/// Returns [`PolicyParseError::MissingUid`] for objects without a UID and
/// [`PolicyParseError::Content`] if the object cannot be serialized.
pub fn parse_policy(obj: &DynamicObject, kind: PolicyKind) -> Result<Policy, PolicyParseError> {
    let name = obj.name_any();
    let kind = obj
        .types
        .as_ref()
        .map(|t| t.kind.clone())
        .filter(|k| !k.is_empty())
        .unwrap_or_else(|| kind.as_str().to_owned());

    let uid = obj.uid().ok_or_else(|| PolicyParseError::MissingUid {
        kind: kind.clone(),
        name: name.clone(),
    })?;

    let annotations = obj.annotations();
    let annotation = |key: &str| annotations.get(key).cloned().unwrap_or_default();

    let autogen_controllers = annotations
        .get(ANNOTATION_AUTOGEN)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty() && *c != "none")
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default();

    let spec = obj.data.get("spec");
    let rules = spec
        .and_then(|s| s.get("rules"))
        .and_then(Value::as_array)
        .map(|rules| rules.iter().filter_map(parse_rule).collect())
        .unwrap_or_default();

    let mut raw = obj.clone();
    raw.metadata.managed_fields = None;
    let content = serde_json::to_string_pretty(&raw).map_err(|source| PolicyParseError::Content {
        name: name.clone(),
        source,
    })?;

    Ok(Policy {
        kind,
        namespace: obj.namespace().unwrap_or_default(),
        autogen_controllers,
        validation_failure_action: spec
            .and_then(|s| s.get("validationFailureAction"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned(),
        background: spec
            .and_then(|s| s.get("background"))
            .and_then(Value::as_bool)
            .unwrap_or(true),
        rules,
        category: annotation(ANNOTATION_CATEGORY),
        description: annotation(ANNOTATION_DESCRIPTION),
        severity: annotation(ANNOTATION_SEVERITY),
        creation_timestamp: obj.creation_timestamp().map(|t| t.0),
        uid,
        content,
        name,
    })
}

fn parse_rule(value: &Value) -> Option<Rule> {
    let name = value.get("name")?.as_str()?.to_owned();

    let rule_type = if value.get("mutate").is_some() {
        RuleType::Mutation
    } else if value.get("generate").is_some() {
        RuleType::Generation
    } else if value.get("verifyImages").is_some() {
        RuleType::ImageVerify
    } else {
        RuleType::Validation
    };

    let validate_message = value
        .pointer("/validate/message")
        .and_then(Value::as_str)
        .map(str::to_owned);

    Some(Rule {
        validate_message,
        name,
        rule_type,
    })
}
