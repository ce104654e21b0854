//! IAM Policy API
//!
//! Trait-based abstraction over the six IAM calls the reconciler needs,
//! plus structured error classification. [`AwsIamClient`] is the
//! `aws-sdk-iam` implementation; tests substitute an in-memory fake.

mod aws;

pub use aws::{AwsConnector, AwsIamClient};

use async_trait::async_trait;
use thiserror::Error;

/// A managed policy as reported by IAM
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePolicy {
    pub arn: String,
    pub id: Option<String>,
    pub name: Option<String>,
    pub path: Option<String>,
    pub default_version_id: Option<String>,
}

/// One version of a managed policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePolicyVersion {
    pub version_id: Option<String>,
    /// Decoded JSON document text, when returned
    pub document: Option<String>,
    pub is_default: bool,
}

/// Parameters for creating a new managed policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePolicyRequest {
    pub name: String,
    pub document: String,
    pub description: String,
    pub path: String,
}

/// Broad category of an IAM failure, derived from the AWS error code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IamErrorKind {
    /// `NoSuchEntity`
    NotFound,
    /// `DeleteConflict`, `EntityAlreadyExists`, `ConcurrentModification`
    Conflict,
    /// `LimitExceeded`
    LimitExceeded,
    /// `MalformedPolicyDocument`, `InvalidInput`
    InvalidInput,
    /// Anything else, including transport failures
    Other,
}

impl IamErrorKind {
    /// Classify an AWS error code
    pub fn from_code(code: Option<&str>) -> Self {
        match code {
            Some("NoSuchEntity") => IamErrorKind::NotFound,
            Some("DeleteConflict" | "EntityAlreadyExists" | "ConcurrentModification") => {
                IamErrorKind::Conflict
            }
            Some("LimitExceeded") => IamErrorKind::LimitExceeded,
            Some("MalformedPolicyDocument" | "InvalidInput") => IamErrorKind::InvalidInput,
            _ => IamErrorKind::Other,
        }
    }
}

impl std::fmt::Display for IamErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IamErrorKind::NotFound => write!(f, "not found"),
            IamErrorKind::Conflict => write!(f, "conflict"),
            IamErrorKind::LimitExceeded => write!(f, "limit exceeded"),
            IamErrorKind::InvalidInput => write!(f, "invalid input"),
            IamErrorKind::Other => write!(f, "error"),
        }
    }
}

/// Failure of a single IAM call
#[derive(Debug, Clone, Error)]
#[error("{operation} failed ({kind}): {message}")]
pub struct IamError {
    pub kind: IamErrorKind,
    pub operation: &'static str,
    pub message: String,
}

impl IamError {
    pub fn new(kind: IamErrorKind, operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind,
            operation,
            message: message.into(),
        }
    }

    pub fn not_found(operation: &'static str, message: impl Into<String>) -> Self {
        Self::new(IamErrorKind::NotFound, operation, message)
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == IamErrorKind::NotFound
    }
}

/// Remote IAM policy operations
#[async_trait]
pub trait PolicyApi: Send + Sync {
    /// Look up a policy by ARN
    async fn get_policy(&self, arn: &str) -> Result<RemotePolicy, IamError>;

    /// Fetch one version of a policy, document included
    async fn get_policy_version(
        &self,
        arn: &str,
        version_id: &str,
    ) -> Result<RemotePolicyVersion, IamError>;

    /// Create a new managed policy
    async fn create_policy(&self, request: &CreatePolicyRequest) -> Result<RemotePolicy, IamError>;

    /// Add a version to an existing policy
    async fn create_policy_version(
        &self,
        arn: &str,
        document: &str,
        set_as_default: bool,
    ) -> Result<RemotePolicyVersion, IamError>;

    /// Delete a non-default version
    async fn delete_policy_version(&self, arn: &str, version_id: &str) -> Result<(), IamError>;

    /// Delete a policy
    async fn delete_policy(&self, arn: &str) -> Result<(), IamError>;
}

/// Credential and region context for building clients
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderContext {
    /// Region used when the inputs do not name one
    pub region: Option<String>,
    /// Named profile from the shared AWS config files
    pub profile: Option<String>,
}

/// Builds a [`PolicyApi`] for a region
#[async_trait]
pub trait IamConnector: Send + Sync {
    async fn connect(&self, region: &str) -> Result<Box<dyn PolicyApi>, IamError>;
}

/// IAM returns documents URL-encoded (RFC 3986); decode to JSON text
pub fn decode_document(raw: &str) -> String {
    match urlencoding::decode(raw) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_from_code() {
        assert_eq!(IamErrorKind::from_code(Some("NoSuchEntity")), IamErrorKind::NotFound);
        assert_eq!(IamErrorKind::from_code(Some("DeleteConflict")), IamErrorKind::Conflict);
        assert_eq!(
            IamErrorKind::from_code(Some("LimitExceeded")),
            IamErrorKind::LimitExceeded
        );
        assert_eq!(
            IamErrorKind::from_code(Some("MalformedPolicyDocument")),
            IamErrorKind::InvalidInput
        );
        assert_eq!(IamErrorKind::from_code(Some("Throttling")), IamErrorKind::Other);
        assert_eq!(IamErrorKind::from_code(None), IamErrorKind::Other);
    }

    #[test]
    fn test_not_found_is_classified_by_kind_not_message() {
        let err = IamError::new(IamErrorKind::Other, "DeletePolicy", "policy does not exist");
        assert!(!err.is_not_found());

        let err = IamError::not_found("DeletePolicy", "gone");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "DeletePolicy failed (not found): gone");
    }

    #[test]
    fn test_decode_document() {
        let raw = "%7B%22Version%22%3A%222012-10-17%22%2C%22Statement%22%3A%5B%5D%7D";
        assert_eq!(
            decode_document(raw),
            r#"{"Version":"2012-10-17","Statement":[]}"#
        );
        assert_eq!(decode_document(r#"{"a":1}"#), r#"{"a":1}"#);
    }
}
