//! AWS SDK implementation of [`PolicyApi`]
//!
//! Credentials come from the default provider chain (environment, shared
//! config/profile, web identity, IMDS). Errors are classified from the
//! structured AWS error code.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_iam::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_iam::types::{Policy, PolicyVersion};
use aws_sdk_iam::Client;
use tracing::debug;

use super::{
    decode_document, CreatePolicyRequest, IamConnector, IamError, IamErrorKind, PolicyApi,
    ProviderContext, RemotePolicy, RemotePolicyVersion,
};

/// IAM client backed by `aws-sdk-iam`
pub struct AwsIamClient {
    client: Client,
}

impl AwsIamClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client for `region` using the default credential chain
    pub async fn from_env(region: &str, profile: Option<&str>) -> Self {
        debug!("Loading AWS config for region: {}", region);

        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(region.to_string()));
        if let Some(profile) = profile {
            loader = loader.profile_name(profile);
        }
        let config = loader.load().await;

        Self::new(Client::new(&config))
    }
}

fn classify<E, R>(operation: &'static str, err: SdkError<E, R>) -> IamError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let kind = IamErrorKind::from_code(err.code());
    IamError::new(kind, operation, DisplayErrorContext(&err).to_string())
}

fn remote_policy(policy: &Policy, fallback_arn: &str) -> RemotePolicy {
    RemotePolicy {
        arn: policy.arn().unwrap_or(fallback_arn).to_string(),
        id: policy.policy_id().map(str::to_string),
        name: policy.policy_name().map(str::to_string),
        path: policy.path().map(str::to_string),
        default_version_id: policy.default_version_id().map(str::to_string),
    }
}

fn remote_version(version: &PolicyVersion) -> RemotePolicyVersion {
    RemotePolicyVersion {
        version_id: version.version_id().map(str::to_string),
        document: version.document().map(decode_document),
        is_default: version.is_default_version(),
    }
}

#[async_trait]
impl PolicyApi for AwsIamClient {
    async fn get_policy(&self, arn: &str) -> Result<RemotePolicy, IamError> {
        debug!(arn = %arn, "GetPolicy");

        let output = self
            .client
            .get_policy()
            .policy_arn(arn)
            .send()
            .await
            .map_err(|e| classify("GetPolicy", e))?;

        output
            .policy()
            .map(|p| remote_policy(p, arn))
            .ok_or_else(|| IamError::not_found("GetPolicy", format!("no policy returned for {}", arn)))
    }

    async fn get_policy_version(
        &self,
        arn: &str,
        version_id: &str,
    ) -> Result<RemotePolicyVersion, IamError> {
        debug!(arn = %arn, version = %version_id, "GetPolicyVersion");

        let output = self
            .client
            .get_policy_version()
            .policy_arn(arn)
            .version_id(version_id)
            .send()
            .await
            .map_err(|e| classify("GetPolicyVersion", e))?;

        output.policy_version().map(remote_version).ok_or_else(|| {
            IamError::not_found(
                "GetPolicyVersion",
                format!("no version {} returned for {}", version_id, arn),
            )
        })
    }

    async fn create_policy(&self, request: &CreatePolicyRequest) -> Result<RemotePolicy, IamError> {
        debug!(name = %request.name, path = %request.path, "CreatePolicy");

        let output = self
            .client
            .create_policy()
            .policy_name(&request.name)
            .policy_document(&request.document)
            .description(&request.description)
            .path(&request.path)
            .send()
            .await
            .map_err(|e| classify("CreatePolicy", e))?;

        let policy = output.policy().ok_or_else(|| {
            IamError::new(IamErrorKind::Other, "CreatePolicy", "no policy in response")
        })?;

        if policy.arn().is_none() {
            return Err(IamError::new(
                IamErrorKind::Other,
                "CreatePolicy",
                "policy in response has no ARN",
            ));
        }

        Ok(remote_policy(policy, ""))
    }

    async fn create_policy_version(
        &self,
        arn: &str,
        document: &str,
        set_as_default: bool,
    ) -> Result<RemotePolicyVersion, IamError> {
        debug!(arn = %arn, set_as_default = set_as_default, "CreatePolicyVersion");

        let output = self
            .client
            .create_policy_version()
            .policy_arn(arn)
            .policy_document(document)
            .set_as_default(set_as_default)
            .send()
            .await
            .map_err(|e| classify("CreatePolicyVersion", e))?;

        output.policy_version().map(remote_version).ok_or_else(|| {
            IamError::new(
                IamErrorKind::Other,
                "CreatePolicyVersion",
                "no version in response",
            )
        })
    }

    async fn delete_policy_version(&self, arn: &str, version_id: &str) -> Result<(), IamError> {
        debug!(arn = %arn, version = %version_id, "DeletePolicyVersion");

        self.client
            .delete_policy_version()
            .policy_arn(arn)
            .version_id(version_id)
            .send()
            .await
            .map_err(|e| classify("DeletePolicyVersion", e))?;

        Ok(())
    }

    async fn delete_policy(&self, arn: &str) -> Result<(), IamError> {
        debug!(arn = %arn, "DeletePolicy");

        self.client
            .delete_policy()
            .policy_arn(arn)
            .send()
            .await
            .map_err(|e| classify("DeletePolicy", e))?;

        Ok(())
    }
}

/// Connects [`AwsIamClient`]s using a [`ProviderContext`]
pub struct AwsConnector {
    context: ProviderContext,
}

impl AwsConnector {
    pub fn new(context: ProviderContext) -> Self {
        Self { context }
    }
}

#[async_trait]
impl IamConnector for AwsConnector {
    async fn connect(&self, region: &str) -> Result<Box<dyn PolicyApi>, IamError> {
        let client = AwsIamClient::from_env(region, self.context.profile.as_deref()).await;
        Ok(Box::new(client))
    }
}
