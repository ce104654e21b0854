//! Types for IAM policy reconciliation
//!
//! Inputs supplied by the caller, the state persisted between runs, the
//! outputs returned from a deploy, and the crate-level error type.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::iam::IamError;
use crate::state::StateError;

/// A policy document as supplied by the caller
///
/// Either a JSON object or a string holding a serialized object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PolicyDocument {
    /// Serialized JSON text
    Serialized(String),
    /// Already-parsed JSON document
    Document(Value),
}

impl PolicyDocument {
    /// Parse the document into a JSON value
    pub fn to_value(&self) -> Result<Value, PolicyError> {
        match self {
            PolicyDocument::Document(value) => Ok(value.clone()),
            PolicyDocument::Serialized(text) => {
                serde_json::from_str(text).map_err(PolicyError::InvalidDocument)
            }
        }
    }

    /// Canonical serialized form (compact, object keys sorted)
    pub fn canonical(&self) -> Result<String, PolicyError> {
        let value = self.to_value()?;
        Ok(canonical_string(&value))
    }
}

impl From<Value> for PolicyDocument {
    fn from(value: Value) -> Self {
        PolicyDocument::Document(value)
    }
}

/// Serialize a document the same way regardless of how it was supplied
pub fn canonical_string(value: &Value) -> String {
    // serde_json maps are BTreeMaps, so keys come out sorted
    value.to_string()
}

/// Desired configuration for the policy
///
/// Every field is optional; missing fields fall back to prior state and
/// then to built-in defaults (see [`crate::config::resolve`]).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyInputs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<PolicyDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl PolicyInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn policy(mut self, policy: impl Into<PolicyDocument>) -> Self {
        self.policy = Some(policy.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Overlay `other` on top of `self`, keeping fields `other` leaves unset
    pub fn merge(self, other: PolicyInputs) -> Self {
        Self {
            region: other.region.or(self.region),
            policy: other.policy.or(self.policy),
            name: other.name.or(self.name),
            description: other.description.or(self.description),
            path: other.path.or(self.path),
        }
    }
}

/// State persisted between runs
///
/// Mirrors the last policy that was successfully reconciled. An empty
/// state (all fields `None`) means no policy is managed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// ARN of a renamed-away policy whose delete failed; retried next run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_policy_arn: Option<String>,
}

impl PolicyState {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Attributes returned from a successful deploy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyOutputs {
    pub id: String,
    pub name: String,
    pub arn: String,
    pub version: String,
    pub policy: Value,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_policy_arn: Option<String>,
}

impl From<&PolicyOutputs> for PolicyState {
    fn from(outputs: &PolicyOutputs) -> Self {
        Self {
            id: Some(outputs.id.clone()),
            name: Some(outputs.name.clone()),
            arn: Some(outputs.arn.clone()),
            version: Some(outputs.version.clone()),
            policy: Some(outputs.policy.clone()),
            path: Some(outputs.path.clone()),
            last_policy_arn: outputs.last_policy_arn.clone(),
        }
    }
}

/// Errors that abort a deploy or remove
#[derive(Debug, Error)]
pub enum PolicyError {
    /// Policy creation failed with no existing policy to fall back to
    #[error("Failed to create policy: {0}")]
    Create(#[source] IamError),

    /// Deleting the managed policy failed for a reason other than not-found
    #[error("Failed to delete policy: {0}")]
    Delete(#[source] IamError),

    /// Serialized policy document is not valid JSON
    #[error("Invalid policy document: {0}")]
    InvalidDocument(#[source] serde_json::Error),

    /// Could not build a client for the requested region
    #[error("Failed to connect to IAM in {region}: {message}")]
    Connect { region: String, message: String },

    /// Loading or saving state failed
    #[error(transparent)]
    State(#[from] StateError),
}
