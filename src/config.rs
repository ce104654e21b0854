//! Layered input resolution
//!
//! Resolves the effective configuration for a deploy from three layers:
//! explicit input > prior state > built-in defaults. Each field is taken
//! whole from the highest layer that sets it.

use serde_json::{json, Value};
use uuid::Uuid;

use crate::types::{canonical_string, PolicyError, PolicyInputs, PolicyState};

/// Region used when neither input nor provider context names one
pub const DEFAULT_REGION: &str = "us-east-1";

/// Description applied to policies created without one
pub const DEFAULT_DESCRIPTION: &str = "A policy created by aws-iam-policy";

/// Path applied to policies created without one
pub const DEFAULT_PATH: &str = "/";

/// Built-in defaults for every input field
#[derive(Debug, Clone, PartialEq)]
pub struct Defaults {
    pub region: String,
    pub policy: Value,
    pub name: String,
    pub description: String,
    pub path: String,
}

impl Defaults {
    /// Defaults with a freshly generated policy name
    ///
    /// `context_region` is the provider context's region, if configured.
    pub fn new(context_region: Option<&str>) -> Self {
        Self {
            region: context_region.unwrap_or(DEFAULT_REGION).to_string(),
            policy: default_policy(),
            name: generate_name(),
            description: DEFAULT_DESCRIPTION.to_string(),
            path: DEFAULT_PATH.to_string(),
        }
    }
}

/// Minimal document allowing `iam:GetPolicyVersion`
pub fn default_policy() -> Value {
    json!({
        "Version": "2012-10-17",
        "Statement": [
            {
                "Effect": "Allow",
                "Action": ["iam:GetPolicyVersion"],
                "Resource": "*"
            }
        ]
    })
}

/// Generate a unique policy name (`policy-<10 hex chars>`)
pub fn generate_name() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("policy-{}", &id[..10])
}

/// Fully resolved configuration for one deploy
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedInputs {
    pub region: String,
    /// Parsed desired document
    pub policy: Value,
    /// Canonical serialized form of `policy`
    pub document: String,
    pub name: String,
    pub description: String,
    pub path: String,
    /// Caller supplied `name` explicitly (drives rename detection)
    pub explicit_name: Option<String>,
}

/// Resolve inputs over state over defaults
pub fn resolve(
    inputs: &PolicyInputs,
    state: &PolicyState,
    defaults: &Defaults,
) -> Result<ResolvedInputs, PolicyError> {
    let policy = match &inputs.policy {
        Some(doc) => doc.to_value()?,
        None => state.policy.clone().unwrap_or_else(|| defaults.policy.clone()),
    };
    let document = canonical_string(&policy);

    let name = inputs
        .name
        .clone()
        .or_else(|| state.name.clone())
        .unwrap_or_else(|| defaults.name.clone());

    let path = inputs
        .path
        .clone()
        .or_else(|| state.path.clone())
        .unwrap_or_else(|| defaults.path.clone());

    Ok(ResolvedInputs {
        region: inputs
            .region
            .clone()
            .unwrap_or_else(|| defaults.region.clone()),
        policy,
        document,
        name,
        description: inputs
            .description
            .clone()
            .unwrap_or_else(|| defaults.description.clone()),
        path,
        explicit_name: inputs.name.clone(),
    })
}

/// Region for a remove: explicit input, else the defaults' region
pub fn resolve_region(inputs: &PolicyInputs, defaults: &Defaults) -> String {
    inputs
        .region
        .clone()
        .unwrap_or_else(|| defaults.region.clone())
}
