//! Policy reconciliation
//!
//! `deploy` and `remove` take the prior state by value and hand back the
//! new state; nothing here touches persistence. Recoverable IAM failures
//! (lookups, stale version deletes, orphan cleanup) are logged at debug
//! and treated as absence. Only creation failures and non-not-found
//! teardown failures surface as errors.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::config::ResolvedInputs;
use crate::iam::{CreatePolicyRequest, PolicyApi, RemotePolicy, RemotePolicyVersion};
use crate::types::{PolicyError, PolicyOutputs, PolicyState};

/// Version reported when IAM omits one (new policies start at `v1`)
pub const INITIAL_VERSION: &str = "v1";

/// What a deploy did to the remote policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployAction {
    Created,
    Updated,
    Unchanged,
}

impl std::fmt::Display for DeployAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeployAction::Created => write!(f, "created"),
            DeployAction::Updated => write!(f, "updated"),
            DeployAction::Unchanged => write!(f, "unchanged"),
        }
    }
}

/// Result of a deploy
#[derive(Debug, Clone, PartialEq)]
pub struct DeployOutcome {
    pub state: PolicyState,
    pub outputs: PolicyOutputs,
    pub action: DeployAction,
}

/// What a remove did to the remote policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoveAction {
    /// Policy deleted
    Deleted,
    /// IAM reported the policy already gone
    AlreadyAbsent,
    /// No ARN in state, nothing to delete
    Skipped,
}

/// A policy found in IAM together with its default version
struct ExistingPolicy {
    policy: RemotePolicy,
    version: RemotePolicyVersion,
}

/// Reconcile the remote policy with `inputs`
pub async fn deploy(
    api: &dyn PolicyApi,
    mut state: PolicyState,
    inputs: &ResolvedInputs,
) -> Result<DeployOutcome, PolicyError> {
    let name = inputs.name.as_str();

    if let Some(last_arn) = state.last_policy_arn.take() {
        cleanup_orphan(api, name, &last_arn).await;
    }

    let mut pending_last_arn = None;
    let mut existing = None;

    let renamed = match (&state.arn, &inputs.explicit_name) {
        (Some(_), Some(explicit)) => state.name.as_deref() != Some(explicit.as_str()),
        _ => false,
    };

    if let (true, Some(arn)) = (renamed, state.arn.as_deref()) {
        debug!(name = %name, arn = %arn, "New policy required for rename");

        match api.delete_policy(arn).await {
            Ok(()) => debug!(arn = %arn, "Old policy deleted"),
            Err(e) if e.is_not_found() => debug!(arn = %arn, "Old policy already deleted"),
            Err(e) => {
                debug!(
                    name = %name,
                    arn = %arn,
                    error = %e,
                    "Could not delete old policy, will retry next run"
                );
                pending_last_arn = Some(arn.to_string());
            }
        }
    } else if let Some(arn) = state.arn.as_deref() {
        existing = fetch_existing(api, name, arn).await;
    }

    let mut action = DeployAction::Unchanged;
    let mut current: Option<(RemotePolicy, Option<String>)> = None;

    if let Some(found) = existing {
        if document_matches(found.version.document.as_deref(), &inputs.policy) {
            debug!(name = %name, "No policy changes required");
            current = Some((found.policy, found.version.version_id));
        } else {
            current = update_document(api, name, found, &inputs.document).await;
            if current.is_some() {
                action = DeployAction::Updated;
            }
        }
    }

    let (policy, version) = match current {
        Some(current) => current,
        None => {
            info!(name = %name, path = %inputs.path, "Creating new policy");

            let request = CreatePolicyRequest {
                name: inputs.name.clone(),
                document: inputs.document.clone(),
                description: inputs.description.clone(),
                path: inputs.path.clone(),
            };
            let created = api
                .create_policy(&request)
                .await
                .map_err(PolicyError::Create)?;

            action = DeployAction::Created;
            let version = created.default_version_id.clone();
            (created, version)
        }
    };

    let outputs = PolicyOutputs {
        id: policy.id.unwrap_or_default(),
        name: policy.name.unwrap_or_else(|| inputs.name.clone()),
        arn: policy.arn,
        version: version.unwrap_or_else(|| INITIAL_VERSION.to_string()),
        policy: inputs.policy.clone(),
        path: policy.path.unwrap_or_else(|| inputs.path.clone()),
        last_policy_arn: pending_last_arn,
    };

    info!(
        name = %outputs.name,
        arn = %outputs.arn,
        version = %outputs.version,
        action = %action,
        "Policy reconciled"
    );

    Ok(DeployOutcome {
        state: PolicyState::from(&outputs),
        outputs,
        action,
    })
}

/// Delete the managed policy and clear state
///
/// Returns the (empty) new state. On a fatal delete error the caller's
/// state is left as it was.
pub async fn remove(
    api: &dyn PolicyApi,
    state: PolicyState,
) -> Result<(PolicyState, RemoveAction), PolicyError> {
    if let Some(last_arn) = state.last_policy_arn.as_deref() {
        cleanup_orphan(api, state.name.as_deref().unwrap_or_default(), last_arn).await;
    }

    let Some(arn) = state.arn.as_deref() else {
        debug!("No policy ARN in state, nothing to remove");
        return Ok((PolicyState::default(), RemoveAction::Skipped));
    };

    let action = match api.delete_policy(arn).await {
        Ok(()) => {
            info!(arn = %arn, "Policy deleted");
            RemoveAction::Deleted
        }
        Err(e) if e.is_not_found() => {
            debug!(arn = %arn, "Policy already deleted");
            RemoveAction::AlreadyAbsent
        }
        Err(e) => return Err(PolicyError::Delete(e)),
    };

    Ok((PolicyState::default(), action))
}

/// Best-effort delete of a policy orphaned by an earlier rename
async fn cleanup_orphan(api: &dyn PolicyApi, name: &str, arn: &str) {
    debug!(name = %name, arn = %arn, "Deleting old policy");

    match api.delete_policy(arn).await {
        Ok(()) => debug!(arn = %arn, "Old policy deleted"),
        Err(e) => debug!(
            name = %name,
            arn = %arn,
            error = %e,
            "Could not delete old policy, abandoning"
        ),
    }
}

/// Fetch the policy and its default version; any failure means absent
async fn fetch_existing(api: &dyn PolicyApi, name: &str, arn: &str) -> Option<ExistingPolicy> {
    let policy = match api.get_policy(arn).await {
        Ok(policy) => policy,
        Err(e) => {
            debug!(name = %name, arn = %arn, error = %e, "Could not fetch current policy");
            return None;
        }
    };

    let Some(version_id) = policy.default_version_id.clone() else {
        debug!(name = %name, arn = %arn, "Current policy has no default version");
        return None;
    };

    match api.get_policy_version(arn, &version_id).await {
        Ok(mut version) => {
            if version.version_id.is_none() {
                version.version_id = Some(version_id);
            }
            Some(ExistingPolicy { policy, version })
        }
        Err(e) => {
            debug!(
                name = %name,
                arn = %arn,
                version = %version_id,
                error = %e,
                "Could not fetch current policy version"
            );
            None
        }
    }
}

/// Push a new default version, then delete the previous default
///
/// Returns `None` when the new version could not be created.
async fn update_document(
    api: &dyn PolicyApi,
    name: &str,
    found: ExistingPolicy,
    document: &str,
) -> Option<(RemotePolicy, Option<String>)> {
    let arn = found.policy.arn.as_str();
    debug!(name = %name, arn = %arn, "Creating new policy version");

    let created = match api.create_policy_version(arn, document, true).await {
        Ok(version) => version,
        Err(e) => {
            debug!(name = %name, arn = %arn, error = %e, "Could not create policy version");
            return None;
        }
    };

    if let Some(previous) = found.version.version_id.as_deref() {
        if created.version_id.as_deref() != Some(previous) {
            if let Err(e) = api.delete_policy_version(arn, previous).await {
                debug!(
                    arn = %arn,
                    version = %previous,
                    error = %e,
                    "Could not delete previous policy version"
                );
            }
        }
    }

    Some((found.policy, created.version_id))
}

/// Compare the remote document text with the desired document as JSON
fn document_matches(remote: Option<&str>, desired: &Value) -> bool {
    remote
        .and_then(|text| serde_json::from_str::<Value>(text).ok())
        .is_some_and(|remote| remote == *desired)
}
