//! In-memory IAM fake for reconciliation tests.
//!
//! `FakeIam` keeps policies and their versions in memory, records every
//! call in order, and can be told to fail specific operations.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use aws_iam_policy::iam::{
    CreatePolicyRequest, IamConnector, IamError, IamErrorKind, PolicyApi, RemotePolicy,
    RemotePolicyVersion,
};

pub const ACCOUNT: &str = "123456789012";

/// A recorded IAM call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    GetPolicy(String),
    GetPolicyVersion(String, String),
    CreatePolicy(String),
    CreatePolicyVersion(String),
    DeletePolicyVersion(String, String),
    DeletePolicy(String),
}

impl Call {
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Call::GetPolicy(_) | Call::GetPolicyVersion(..))
    }
}

#[derive(Debug, Clone)]
pub struct FakePolicy {
    pub id: String,
    pub name: String,
    pub path: String,
    pub default_version: String,
    pub versions: BTreeMap<String, String>,
    next_version: u32,
}

#[derive(Default)]
struct Inner {
    policies: HashMap<String, FakePolicy>,
    calls: Vec<Call>,
    failures: HashMap<&'static str, IamErrorKind>,
    created: u32,
    regions: Vec<String>,
}

/// Shared in-memory IAM; clones see the same data
#[derive(Clone, Default)]
pub struct FakeIam {
    inner: Arc<Mutex<Inner>>,
}

impl FakeIam {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call to `operation` fail with `kind`
    pub fn fail(&self, operation: &'static str, kind: IamErrorKind) {
        self.inner.lock().unwrap().failures.insert(operation, kind);
    }

    pub fn clear_failures(&self) {
        self.inner.lock().unwrap().failures.clear();
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn mutations(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_mutation).collect()
    }

    pub fn reset_calls(&self) {
        self.inner.lock().unwrap().calls.clear();
    }

    pub fn policy(&self, arn: &str) -> Option<FakePolicy> {
        self.inner.lock().unwrap().policies.get(arn).cloned()
    }

    pub fn policy_count(&self) -> usize {
        self.inner.lock().unwrap().policies.len()
    }

    pub fn regions(&self) -> Vec<String> {
        self.inner.lock().unwrap().regions.clone()
    }

    /// Remove a policy behind the component's back
    pub fn delete_out_of_band(&self, arn: &str) {
        self.inner.lock().unwrap().policies.remove(arn);
    }

    /// Overwrite the stored text of the default version
    pub fn set_default_document(&self, arn: &str, document: &str) {
        let mut inner = self.inner.lock().unwrap();
        let policy = inner.policies.get_mut(arn).unwrap();
        let default = policy.default_version.clone();
        policy.versions.insert(default, document.to_string());
    }

    fn record(&self, call: Call, operation: &'static str) -> Result<(), IamError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(call);
        match inner.failures.get(operation) {
            Some(kind) => Err(IamError::new(*kind, operation, "injected failure")),
            None => Ok(()),
        }
    }

    fn remote(arn: &str, policy: &FakePolicy) -> RemotePolicy {
        RemotePolicy {
            arn: arn.to_string(),
            id: Some(policy.id.clone()),
            name: Some(policy.name.clone()),
            path: Some(policy.path.clone()),
            default_version_id: Some(policy.default_version.clone()),
        }
    }
}

fn missing(operation: &'static str, arn: &str) -> IamError {
    IamError::not_found(operation, format!("Policy {} does not exist", arn))
}

#[async_trait]
impl PolicyApi for FakeIam {
    async fn get_policy(&self, arn: &str) -> Result<RemotePolicy, IamError> {
        self.record(Call::GetPolicy(arn.to_string()), "GetPolicy")?;
        let inner = self.inner.lock().unwrap();
        let policy = inner
            .policies
            .get(arn)
            .ok_or_else(|| missing("GetPolicy", arn))?;
        Ok(Self::remote(arn, policy))
    }

    async fn get_policy_version(
        &self,
        arn: &str,
        version_id: &str,
    ) -> Result<RemotePolicyVersion, IamError> {
        self.record(
            Call::GetPolicyVersion(arn.to_string(), version_id.to_string()),
            "GetPolicyVersion",
        )?;
        let inner = self.inner.lock().unwrap();
        let policy = inner
            .policies
            .get(arn)
            .ok_or_else(|| missing("GetPolicyVersion", arn))?;
        let document = policy
            .versions
            .get(version_id)
            .ok_or_else(|| missing("GetPolicyVersion", arn))?;
        Ok(RemotePolicyVersion {
            version_id: Some(version_id.to_string()),
            // IAM hands documents back URL-encoded
            document: Some(aws_iam_policy::iam::decode_document(
                &urlencoding::encode(document),
            )),
            is_default: policy.default_version == version_id,
        })
    }

    async fn create_policy(&self, request: &CreatePolicyRequest) -> Result<RemotePolicy, IamError> {
        self.record(Call::CreatePolicy(request.name.clone()), "CreatePolicy")?;
        let mut inner = self.inner.lock().unwrap();

        let arn = format!(
            "arn:aws:iam::{}:policy{}{}",
            ACCOUNT, request.path, request.name
        );
        if inner.policies.contains_key(&arn) {
            return Err(IamError::new(
                IamErrorKind::Conflict,
                "CreatePolicy",
                format!("A policy called {} already exists", request.name),
            ));
        }

        inner.created += 1;
        let policy = FakePolicy {
            id: format!("ANPA{:08}", inner.created),
            name: request.name.clone(),
            path: request.path.clone(),
            default_version: "v1".to_string(),
            versions: BTreeMap::from([("v1".to_string(), request.document.clone())]),
            next_version: 2,
        };
        let remote = Self::remote(&arn, &policy);
        inner.policies.insert(arn, policy);
        Ok(remote)
    }

    async fn create_policy_version(
        &self,
        arn: &str,
        document: &str,
        set_as_default: bool,
    ) -> Result<RemotePolicyVersion, IamError> {
        self.record(Call::CreatePolicyVersion(arn.to_string()), "CreatePolicyVersion")?;
        let mut inner = self.inner.lock().unwrap();
        let policy = inner
            .policies
            .get_mut(arn)
            .ok_or_else(|| missing("CreatePolicyVersion", arn))?;

        if policy.versions.len() >= 5 {
            return Err(IamError::new(
                IamErrorKind::LimitExceeded,
                "CreatePolicyVersion",
                "A managed policy can have up to 5 versions",
            ));
        }

        let version_id = format!("v{}", policy.next_version);
        policy.next_version += 1;
        policy.versions.insert(version_id.clone(), document.to_string());
        if set_as_default {
            policy.default_version = version_id.clone();
        }

        Ok(RemotePolicyVersion {
            version_id: Some(version_id),
            document: None,
            is_default: set_as_default,
        })
    }

    async fn delete_policy_version(&self, arn: &str, version_id: &str) -> Result<(), IamError> {
        self.record(
            Call::DeletePolicyVersion(arn.to_string(), version_id.to_string()),
            "DeletePolicyVersion",
        )?;
        let mut inner = self.inner.lock().unwrap();
        let policy = inner
            .policies
            .get_mut(arn)
            .ok_or_else(|| missing("DeletePolicyVersion", arn))?;

        if policy.default_version == version_id {
            return Err(IamError::new(
                IamErrorKind::Conflict,
                "DeletePolicyVersion",
                "Cannot delete the default version",
            ));
        }
        policy
            .versions
            .remove(version_id)
            .map(|_| ())
            .ok_or_else(|| missing("DeletePolicyVersion", arn))
    }

    async fn delete_policy(&self, arn: &str) -> Result<(), IamError> {
        self.record(Call::DeletePolicy(arn.to_string()), "DeletePolicy")?;
        let mut inner = self.inner.lock().unwrap();
        inner
            .policies
            .remove(arn)
            .map(|_| ())
            .ok_or_else(|| missing("DeletePolicy", arn))
    }
}

#[async_trait]
impl IamConnector for FakeIam {
    async fn connect(&self, region: &str) -> Result<Box<dyn PolicyApi>, IamError> {
        self.inner.lock().unwrap().regions.push(region.to_string());
        Ok(Box::new(self.clone()))
    }
}
